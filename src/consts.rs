/// Name of the builtin NAND gate. It is implicitly the first chip of every
/// package and cannot be redefined.
pub const NAND_CHIP_NAME: &str = "Nand";

/// Keyword that introduces a chip declaration.
pub const CHIP_KEYWORD: &str = "chip";

/// Keyword that introduces a return statement.
pub const RETURN_KEYWORD: &str = "return";

/// Keyword for the register constructor expression.
pub const REGISTER_KEYWORD: &str = "Register";
