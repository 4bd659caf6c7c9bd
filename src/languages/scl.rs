//! State Construction Language
//!
//! ```text
//! type Account { id: int; balance: int; }
//! context Bank { limit: int; }
//! state Open uses Bank {
//!   pre { balance >= 0; }
//!   update Account set balance = balance + 1 where id = 1;
//!   next { when balance > limit => Frozen otherwise => Open }
//! }
//! ```
//!
//! `identifier` is the word token, so keywords such as `type` or `next` are
//! recognized only where the grammar expects them.

use once_cell::sync::Lazy;

use crate::generate::{
    GrammarBuilder, Rule, choice, field, optional, pattern, prec, prec_left, repeat, repeat1, seq, string, sym,
    token,
};
use crate::grammar::{Language, LanguageHandle};

mod precedence {
    pub const IMPLIES: i16 = 1;
    pub const OR: i16 = 2;
    pub const AND: i16 = 3;
    pub const EQ: i16 = 4;
    pub const REL: i16 = 5;
    pub const ADD: i16 = 6;
    pub const MUL: i16 = 7;
    pub const UNARY: i16 = 8;
}

static ARTIFACT: Lazy<Vec<u8>> = Lazy::new(|| grammar().compile().expect("bundled SCL grammar compiles"));

static LANGUAGE: Lazy<Language> = Lazy::new(|| language_handle().load().expect("bundled SCL artifact loads"));

/// Handle to the compiled SCL grammar
pub fn language_handle() -> LanguageHandle {
    LanguageHandle::from_static(ARTIFACT.as_slice())
}

pub fn language() -> Language {
    LANGUAGE.clone()
}

fn comma_sep1(rule: Rule) -> Rule {
    seq([rule.clone(), repeat(seq([string(","), rule]))])
}

fn comma_sep(rule: Rule) -> Rule {
    optional(comma_sep1(rule))
}

/// `name: type;`
fn typed_field() -> Rule {
    seq([
        field("name", sym("identifier")),
        string(":"),
        field("type", sym("type")),
        string(";"),
    ])
}

fn binary(level: i16, operators: &[&str]) -> Rule {
    let operator = choice(operators.iter().map(|op| string(*op)));
    prec_left(level, seq([sym("expr"), operator, sym("expr")]))
}

pub(crate) fn grammar() -> GrammarBuilder {
    use precedence::*;

    GrammarBuilder::new("scl")
        .extra(pattern(r"\s"))
        .extra(sym("comment"))
        .word("identifier")
        // ===== Program =====
        .rule(
            "program",
            repeat(choice([sym("type_decl"), sym("context_decl"), sym("state_decl")])),
        )
        .rule(
            "type_decl",
            seq([
                string("type"),
                field("name", sym("identifier")),
                string("{"),
                repeat1(sym("type_field")),
                string("}"),
            ]),
        )
        .rule("type_field", typed_field())
        .rule(
            "context_decl",
            seq([
                string("context"),
                field("name", sym("identifier")),
                string("{"),
                repeat(sym("context_field")),
                string("}"),
            ]),
        )
        .rule("context_field", typed_field())
        .rule(
            "state_decl",
            seq([
                string("state"),
                field("name", sym("identifier")),
                string("uses"),
                comma_sep1(sym("identifier")),
                string("{"),
                repeat(sym("use_stmt")),
                optional(sym("precondition_block")),
                repeat(sym("statement")),
                sym("next_block"),
                string("}"),
            ]),
        )
        // ===== Name introduction =====
        .rule(
            "use_stmt",
            choice([
                sym("use_state_stmt"),
                sym("use_context_stmt"),
                sym("use_type_stmt"),
            ]),
        )
        .rule(
            "use_state_stmt",
            seq([
                string("use"),
                string("state"),
                field("source", sym("qualified_name")),
                string("{"),
                repeat1(sym("use_field")),
                string("}"),
            ]),
        )
        .rule(
            "use_context_stmt",
            seq([
                string("use"),
                string("context"),
                field("context", sym("qualified_name")),
                string(";"),
            ]),
        )
        .rule(
            "use_type_stmt",
            seq([
                string("use"),
                string("type"),
                field("type", sym("qualified_name")),
                string(";"),
            ]),
        )
        .rule("use_field", typed_field())
        .rule(
            "precondition_block",
            seq([
                choice([string("precondition"), string("pre")]),
                string("{"),
                repeat1(seq([sym("condition"), string(";")])),
                string("}"),
            ]),
        )
        // ===== Statements =====
        .rule(
            "statement",
            choice([
                sym("let_stmt"),
                sym("select_stmt"),
                sym("foreach_stmt"),
                sym("update_stmt"),
                sym("insert_stmt"),
                sym("delete_stmt"),
                sym("assert_stmt"),
                sym("commit_stmt"),
            ]),
        )
        .rule(
            "let_stmt",
            seq([
                string("let"),
                field("name", sym("identifier")),
                string(":"),
                field("type", sym("type")),
                string("="),
                field("value", sym("expr")),
                string(";"),
            ]),
        )
        .rule(
            "select_stmt",
            seq([
                string("select"),
                field("name", sym("identifier")),
                string(":"),
                field("type", sym("type")),
                string("from"),
                field("entity", sym("identifier")),
                optional(sym("where_clause")),
                optional(sym("limit_clause")),
                string(";"),
            ]),
        )
        .rule(
            "foreach_stmt",
            seq([
                string("foreach"),
                field("item", sym("identifier")),
                string(":"),
                field("item_type", sym("type")),
                string("in"),
                field("collection", sym("identifier")),
                string("{"),
                repeat(sym("statement")),
                string("}"),
            ]),
        )
        .rule(
            "update_stmt",
            seq([
                string("update"),
                field("entity", sym("identifier")),
                string("set"),
                comma_sep1(sym("assignment")),
                optional(sym("where_clause")),
                string(";"),
            ]),
        )
        .rule(
            "assignment",
            seq([
                field("field", sym("identifier")),
                string("="),
                field("value", sym("expr")),
            ]),
        )
        .rule(
            "insert_stmt",
            seq([
                string("insert"),
                string("into"),
                field("entity", sym("identifier")),
                string("("),
                comma_sep(sym("identifier")),
                string(")"),
                string("values"),
                string("("),
                comma_sep(sym("expr")),
                string(")"),
                string(";"),
            ]),
        )
        .rule(
            "delete_stmt",
            seq([
                string("delete"),
                string("from"),
                field("entity", sym("identifier")),
                optional(sym("where_clause")),
                string(";"),
            ]),
        )
        .rule("where_clause", seq([string("where"), sym("expr")]))
        .rule("limit_clause", seq([string("limit"), sym("number")]))
        .rule("assert_stmt", seq([string("assert"), sym("expr"), string(";")]))
        .rule("commit_stmt", seq([string("commit"), string(";")]))
        // ===== Transitions =====
        .rule(
            "next_block",
            seq([
                string("next"),
                string("{"),
                repeat1(sym("next_case")),
                string("}"),
            ]),
        )
        .rule(
            "next_case",
            choice([
                seq([
                    string("when"),
                    sym("condition"),
                    string("=>"),
                    field("target", sym("identifier")),
                    optional(sym("edge_export_block")),
                ]),
                seq([
                    string("otherwise"),
                    string("=>"),
                    field("target", sym("identifier")),
                    optional(sym("edge_export_block")),
                ]),
            ]),
        )
        .rule(
            "edge_export_block",
            seq([
                string("{"),
                string("export"),
                repeat1(sym("edge_field")),
                string("}"),
            ]),
        )
        .rule("edge_field", typed_field())
        // ===== Conditions =====
        .rule("condition", sym("tla_expr"))
        .rule(
            "tla_expr",
            choice([
                sym("tla_binary_expr"),
                sym("tla_unary_expr"),
                sym("tla_quantifier"),
                sym("expr"),
            ]),
        )
        .rule(
            "tla_binary_expr",
            choice([
                prec_left(IMPLIES, seq([sym("tla_expr"), string("=>"), sym("tla_expr")])),
                prec_left(OR, seq([sym("tla_expr"), string("\\/"), sym("tla_expr")])),
                prec_left(AND, seq([sym("tla_expr"), string("/\\"), sym("tla_expr")])),
            ]),
        )
        .rule("tla_unary_expr", prec(UNARY, seq([string("~"), sym("tla_expr")])))
        .rule(
            "tla_quantifier",
            seq([
                choice([string("\\E"), string("\\A")]),
                string("Relation"),
                field("relation", sym("identifier")),
                field("var", sym("identifier")),
                string("by"),
                sym("expr"),
                string(":"),
                sym("tla_expr"),
            ]),
        )
        // ===== Expressions =====
        .rule(
            "expr",
            choice([
                sym("binary_expr"),
                sym("unary_expr"),
                sym("field_access"),
                sym("struct_literal"),
                sym("identifier"),
                sym("literal"),
                seq([string("("), sym("expr"), string(")")]),
            ]),
        )
        .rule(
            "struct_literal",
            seq([string("{"), comma_sep1(sym("struct_field")), string("}")]),
        )
        .rule(
            "struct_field",
            seq([
                field("name", sym("identifier")),
                string(":"),
                field("value", sym("expr")),
            ]),
        )
        .rule(
            "binary_expr",
            choice([
                binary(EQ, &["=", "#", "==", "!="]),
                binary(REL, &["<", "<=", ">", ">="]),
                binary(ADD, &["+", "-"]),
                binary(MUL, &["*", "/"]),
            ]),
        )
        .rule(
            "unary_expr",
            prec(UNARY, seq([choice([string("!"), string("-")]), sym("expr")])),
        )
        .rule(
            "field_access",
            seq([
                field("object", sym("identifier")),
                string("."),
                field("field", sym("identifier")),
            ]),
        )
        // ===== Types =====
        .rule(
            "type",
            choice([sym("primitive_type"), sym("generic_type"), sym("identifier")]),
        )
        .rule(
            "primitive_type",
            choice([string("int"), string("bool"), string("string"), string("float")]),
        )
        .rule(
            "generic_type",
            seq([
                field("base", sym("identifier")),
                string("["),
                field("param", sym("type")),
                string("]"),
            ]),
        )
        // ===== Names and literals =====
        .rule(
            "qualified_name",
            choice([
                sym("identifier"),
                seq([sym("string"), string("::"), sym("identifier")]),
            ]),
        )
        .rule(
            "literal",
            choice([
                sym("number"),
                sym("string"),
                sym("boolean"),
                string("null"),
            ]),
        )
        .rule("number", pattern(r"\d+"))
        .rule("boolean", choice([string("true"), string("false")]))
        .rule("string", token(seq([string("\""), repeat(choice([pattern(r#"[^"\\]"#), pattern(r"\\.")])), string("\"")])))
        .rule("identifier", pattern("[a-zA-Z_][a-zA-Z0-9_]*"))
        .rule(
            "comment",
            token(choice([
                seq([string("//"), pattern(".*")]),
                seq([string("/*"), pattern(r"[^*]*\*+([^/*][^*]*\*+)*"), string("/")]),
            ])),
        )
}
