use crate::value::ExprError;
use color_print::cprintln;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // Operations
    #[error("The '{0}' operation with the specified operands is invalid")]
    InvalidOperation(String),

    #[error("Bit index should be between 0 and 7. '{0}' is invalid")]
    BitIndex(i64),

    #[error("{0} operation cannot have {1} as its operand")]
    InvalidOperand(String, String),

    #[error("'IN reg,(port)' operation can use only 'A' as its register operand")]
    InPortRegister,

    #[error("Output value can only be 0")]
    OutValue,

    #[error("The first 8-bit argument of {0} can only be 'A'")]
    AccumulatorOnly(String),

    #[error("The second operand of '{0} A,{1}' is invalid")]
    AluSecondOperand(String, String),

    #[error("{0} cannot have {1} as its first operand")]
    FirstOperand(String, String),

    #[error("'{0} {1},...' cannot have {2} as its second operand")]
    SecondOperand(String, String, String),

    #[error("{0} cannot be used with {1}")]
    Condition(String, String),

    #[error("The EX AF,... operation should use AF' as its second argument")]
    ExAf,

    #[error("The EX DE,... operation should use HL as its second argument")]
    ExDe,

    #[error("The EX operation should use AF, DE, or (SP) as its first argument")]
    ExFirst,

    #[error("The EX (SP)' operation should use HL, IX, or IY as its second argument")]
    ExSp,

    #[error("JP can be used only with (HL), (IX), or (IY), but no other forms of indirection")]
    JpIndirect,

    #[error("JP with an indirect target cannot be used with conditions")]
    JpCondition,

    #[error("RST can be used only with #00, #08, #10, #18, #20, #28, #30, or #38 arguments. #{0:X} is invalid.")]
    RstTarget(i64),

    #[error("{0} AF' is invalid")]
    AltAf(String),

    #[error("Interrupt mode can only be 0, 1, or 2. '{0}' is invalid.")]
    InterruptMode(i64),

    #[error("'LD {0},{1}' is an invalid operation")]
    InvalidLoad(String, String),

    #[error("Relative jump distance should be between -128 and 127. {0} is invalid")]
    RelativeJump(i64),

    #[error("The first operand must be A when using the two-argument form of {0}")]
    TwoArgumentForm(String),

    #[error("POP cannot be used with an expression operand")]
    PopExpression,

    // Labels and pragmas
    #[error("Label '{0}' is already defined")]
    LabelDefined(String),

    #[error("Unexpected #else directive")]
    UnexpectedElse,

    #[error("Unexpected #endif directive")]
    UnexpectedEndif,

    #[error("Missing #endif directive")]
    MissingEndif,

    #[error("SKIP to {0:04X} is invalid, as this address is less than the current address, {1:04X}")]
    SkipBackwards(u16, u16),

    #[error("An EQU pragma must have a label")]
    EquLabel,

    #[error("A VAR pragma must have a label")]
    VarLabel,

    #[error("A VAR pragma cannot redefine a non-VAR-created symbol")]
    VarRedefine,

    #[error("A MODEL pragma can be used only once.")]
    ModelTwice,

    #[error("A MODEL pragma can have only these values: 'SPECTRUM48', 'SPECTRUM128', 'SPECTRUMP3', 'NEXT'.")]
    ModelValue,

    #[error("An #ifmod or #ifnmod directive can be used only with these identifiers: 'SPECTRUM48', 'SPECTRUM128', 'SPECTRUMP3', 'NEXT'.")]
    IfModValue,

    #[error("DEFM/DEFN pragma requires a string argument.")]
    DefmString,

    #[error("ALIGN pragma must be used with a parameter value between 1 and #4000; {0} in an invalid value.")]
    AlignValue(i64),

    #[error("DEFH pragma requires a string argument.")]
    DefhString,

    #[error("DEFH pragma requires a string with even hexadecimal digits.")]
    DefhDigits,

    // Syntax
    #[error("Unexpected token: '{0}'")]
    UnexpectedToken(String),

    #[error("Unexpected end of line")]
    UnexpectedEOL,

    #[error("To use this Spectrum Next-specific instruction, you need to set MODEL type to NEXT explicitly.")]
    NextOnly,

    // Expressions
    #[error("Expression evaluation resulted an error: {0}")]
    Expression(ExprError),

    #[error("This expression cannot be evaluated promptly, it may refer to one or more undefined symbols ({0})")]
    NotEvaluable(String),

    // Files and values
    #[error("Cannot find include file: '{0}'")]
    IncludeNotFound(String),

    #[error("Error reading include file: '{0}' ({1})")]
    IncludeRead(String, String),

    #[error("Include file '{0}' is included more than once into the same parent source file")]
    IncludeTwice(String),

    #[error("Include file '{0}' causes circular file reference")]
    IncludeCircular(String),

    #[error("The current assembly address overflew #FFFF")]
    AddressOverflow,

    #[error("A string value is used where a numeric value is expected.")]
    NumericExpected,

    #[error("A string value is expected.")]
    StringExpected,

    #[error("Cannot use an empty pattern with DEFG pragma.")]
    EmptyPattern,

    #[error("An integral value is expected.")]
    IntegralExpected,

    // Compile-time statements
    #[error("You cannot define a macro without a name.")]
    MacroName,

    #[error("Missing {0} statement.")]
    MissingEnd(&'static str),

    #[error("Macro name '{0}' has already been declared.")]
    MacroDefined(String),

    #[error("Unknown macro argument is used '{0}' macro definition.")]
    UnknownMacroArg(String),

    #[error("Macro definition cannot be nested into another macro definition.")]
    NestedMacro,

    #[error("Orphan '{0}' statement found without a corresponding '{1}' statement.")]
    Orphan(&'static str, &'static str),

    #[error("Loop counter cannot be greater than 65535 (#FFFF).")]
    LoopCount,

    #[error("The {0} pragma can be used only in the global scope.")]
    GlobalOnly(&'static str),

    #[error("Too many errors detected while compiling a loop, further processing aborted.")]
    TooManyLoopErrors,

    #[error("Loop counter exceeded the maximum value of 65535 (#FFFF).")]
    LoopOverflow,

    #[error("IF cannot have an {0} section after a detected ELSE section.")]
    SectionAfterElse(&'static str),

    #[error("{0} section in IF cannot have a label.")]
    SectionLabel(&'static str),

    #[error("$CNT cannot be used outside of loop constructs.")]
    CounterOutsideLoop,

    #[error("The STEP value in a FOR-loop cannot be zero.")]
    ZeroStep,

    #[error("Variable {0} is already declared, it cannot be used as a FOR-loop variable again.")]
    ForVariable(String),

    #[error("BREAK cannot be used outside of loop constructs.")]
    BreakOutsideLoop,

    #[error("CONTINUE cannot be used outside of loop constructs.")]
    ContinueOutsideLoop,

    #[error("Duplicated MACRO argument: {0}.")]
    DuplicateMacroArg(String),

    #[error("Unknown MACRO: {0}.")]
    UnknownMacro(String),

    #[error("The declaration of MACRO {0} contains {1} argument(s), but it is invoked with more parameters ({2}).")]
    TooManyMacroArgs(String, usize, usize),

    #[error("Macro parameter can only be used within a macro declaration.")]
    MacroParamOutside,

    #[error("Cannot pass a macro parameter template in a macro parameter.")]
    MacroParamInArgument,

    #[error("MACRO {0} cannot be expanded deeper than {1} levels.")]
    MacroDepth(String, usize),

    #[error("Cannot open file '{0}' used in INCLUDEBIN pragma ({1}).")]
    IncludeBinOpen(String, String),

    #[error("Invalid INCLUDEBIN offset value (negative, or greater than the file length).")]
    IncludeBinOffset,

    #[error("Invalid INCLUDEBIN length value (negative, or segment exceeds the file length).")]
    IncludeBinLength,

    #[error("Emitting the INCLUDEBIN segment would overflow the #FFFF assembly address.")]
    IncludeBinOverflow,

    #[error("You cannot define a module without a name.")]
    ModuleName,

    #[error("Module with name '{0}' already exists.")]
    ModuleDefined(String),

    #[error("You cannot define a struct without a name.")]
    StructName,

    #[error("Structure name '{0}' has already been declared.")]
    StructDefined(String),

    #[error("Structures can use only pragmas that emit bytes, words, strings, or reserve space.")]
    StructContent,

    #[error("The ENDS statement cannot have a label.")]
    EndsLabel,

    #[error("Duplicated field label {0} in a .struct definition.")]
    DuplicateField(String),

    #[error("A .struct invocation ({0}) cannot have arguments.")]
    StructArguments(String),

    #[error("Field assignment instruction cannot be used outside of .struct invocation.")]
    FieldOutside,

    #[error("The .struct definition of {0} does not have a field named {1}.")]
    UnknownField(String, String),

    #[error("The .struct size of {0} is {1} byte(s). The invocation wants to emit {2} bytes.")]
    StructOverflow(String, usize, usize),

    #[error("LOCAL can be used only within PROC.")]
    LocalOutside,

    #[error("This local symbol is already declared: ({0}).")]
    LocalDefined(String),

    #[error("ERROR: {0}")]
    User(String),

    // Host
    #[error("Failed to open file: {0}")]
    FileOpen(String, String),

    #[error("Failed to create file: {0}")]
    FileCreate(String, String),

    #[error("Failed to parse config {0}: {1}")]
    Config(String, String),
}

impl From<ExprError> for Error {
    fn from(e: ExprError) -> Self {
        match e {
            ExprError::LoopCounter => Error::CounterOutsideLoop,
            ExprError::MacroParam(_) => Error::MacroParamOutside,
            e => Error::Expression(e),
        }
    }
}

impl Error {
    /// Stable diagnostic code
    pub fn code(&self) -> &'static str {
        use Error::*;
        match self {
            InvalidOperation(_) => "Z0001",
            BitIndex(_) => "Z0002",
            InvalidOperand(..) => "Z0004",
            InPortRegister => "Z0005",
            OutValue => "Z0006",
            AccumulatorOnly(_) => "Z0007",
            AluSecondOperand(..) => "Z0008",
            FirstOperand(..) => "Z0009",
            SecondOperand(..) => "Z0010",
            Condition(..) => "Z0011",
            ExAf => "Z0012",
            ExDe => "Z0013",
            ExFirst => "Z0014",
            ExSp => "Z0015",
            JpIndirect => "Z0016",
            JpCondition => "Z0017",
            RstTarget(_) => "Z0018",
            AltAf(_) => "Z0019",
            InterruptMode(_) => "Z0020",
            InvalidLoad(..) => "Z0021",
            RelativeJump(_) => "Z0022",
            TwoArgumentForm(_) => "Z0023",
            PopExpression => "Z0024",
            LabelDefined(_) => "Z0040",
            UnexpectedElse => "Z0060",
            UnexpectedEndif => "Z0061",
            MissingEndif => "Z0062",
            SkipBackwards(..) => "Z0081",
            EquLabel => "Z0082",
            VarLabel => "Z0086",
            VarRedefine => "Z0087",
            ModelTwice => "Z0088",
            ModelValue => "Z0089",
            IfModValue => "Z0090",
            DefmString => "Z0091",
            AlignValue(_) => "Z0092",
            DefhString => "Z0093",
            DefhDigits => "Z0094",
            UnexpectedToken(_) => "Z0100",
            UnexpectedEOL => "Z0101",
            NextOnly => "Z0102",
            Expression(_) => "Z0200",
            NotEvaluable(_) => "Z0201",
            IncludeNotFound(_) => "Z0300",
            IncludeRead(..) => "Z0301",
            IncludeTwice(_) => "Z0302",
            IncludeCircular(_) => "Z0303",
            AddressOverflow => "Z0304",
            NumericExpected => "Z0305",
            StringExpected => "Z0306",
            EmptyPattern => "Z0307",
            IntegralExpected => "Z0308",
            MacroName => "Z0400",
            MissingEnd(_) => "Z0401",
            MacroDefined(_) => "Z0402",
            UnknownMacroArg(_) => "Z0403",
            NestedMacro => "Z0404",
            Orphan(..) => "Z0405",
            LoopCount => "Z0406",
            GlobalOnly(_) => "Z0407",
            TooManyLoopErrors => "Z0408",
            LoopOverflow => "Z0409",
            SectionAfterElse(_) => "Z0410",
            SectionLabel(_) => "Z0411",
            CounterOutsideLoop => "Z0412",
            ZeroStep => "Z0413",
            ForVariable(_) => "Z0414",
            BreakOutsideLoop => "Z0415",
            ContinueOutsideLoop => "Z0416",
            DuplicateMacroArg(_) => "Z0417",
            UnknownMacro(_) => "Z0418",
            TooManyMacroArgs(..) => "Z0419",
            MacroParamOutside => "Z0420",
            MacroDepth(..) => "Z0421",
            MacroParamInArgument => "Z0422",
            IncludeBinOpen(..) => "Z0423",
            IncludeBinOffset => "Z0424",
            IncludeBinLength => "Z0425",
            IncludeBinOverflow => "Z0426",
            ModuleName => "Z0428",
            ModuleDefined(_) => "Z0429",
            StructName => "Z0432",
            StructDefined(_) => "Z0434",
            StructContent => "Z0435",
            EndsLabel => "Z0436",
            DuplicateField(_) => "Z0438",
            StructArguments(_) => "Z0439",
            FieldOutside => "Z0440",
            UnknownField(..) => "Z0441",
            StructOverflow(..) => "Z0442",
            LocalOutside => "Z0448",
            LocalDefined(_) => "Z0449",
            User(_) => "Z0500",
            FileOpen(..) | FileCreate(..) | Config(..) => "IO",
        }
    }
}

/// A diagnostic attached to a source line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblerError {
    pub code: String,
    pub message: String,
    pub file: String,
    pub line: usize,
}

impl AssemblerError {
    pub fn new(error: &Error, file: &str, line: usize) -> Self {
        AssemblerError {
            code: error.code().to_string(),
            message: error.to_string(),
            file: file.to_string(),
            line,
        }
    }

    /// Print error with diagnostic information showing file location and line content
    pub fn print_diag(&self, files: &IndexMap<String, Vec<String>>) {
        cprintln!("<red,bold>error[{}]</>: {}", self.code, self.message);

        // line is 0-based, display as 1-based
        let line_num = self.line + 1;
        cprintln!("     <blue>--></> <underline>{}:{}</>", self.file, line_num);
        cprintln!("      <blue>|</>");

        let line_content = files
            .get(&self.file)
            .and_then(|lines| lines.get(self.line))
            .map(|s| s.as_str())
            .unwrap_or("");

        cprintln!(" <blue>{:>4} |</> {}", line_num, line_content);
        cprintln!("      <blue>|</>");
    }
}
