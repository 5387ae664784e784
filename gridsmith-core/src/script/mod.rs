pub mod edit;
pub mod formula;
pub mod lexer;
pub mod literal;
pub mod scan;

pub use edit::{apply_edits, indent_at, TextEdit};
pub use formula::{is_formula, self_references};
pub use lexer::{code_tokens, matching_close, tokenize, tokenize_lossy, Token, TokenKind};
pub use literal::{parse_literal, LiteralNode, ScalarKind, Shape, MAX_LITERAL_DEPTH};
pub use scan::{
    find_wrapper, statement_end, Balance, BulkAssignment, BulkProperty, DeclStyle, FunctionDecl, RangeLiteral,
    Script, SheetMethod, SheetNameRef, Wrapper,
};
