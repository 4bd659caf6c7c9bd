//! PlantUML activity diagrams (new syntax)
//!
//! ```text
//! @startuml
//! start
//! :read input;
//! if (valid?) then (yes)
//!   :process;
//! else (no)
//!   :reject;
//! endif
//! stop
//! @enduml
//! ```
//!
//! Free text (`text_word`) matches almost anything, so keywords win only
//! where the grammar expects them and only on an exact-length match.

use once_cell::sync::Lazy;

use crate::generate::{
    GrammarBuilder, Rule, choice, field, optional, pattern, prec, prec_right, repeat, repeat1, seq, string, sym,
    token,
};
use crate::grammar::{Language, LanguageHandle};

static ARTIFACT: Lazy<Vec<u8>> = Lazy::new(|| {
    grammar()
        .compile()
        .expect("bundled activity diagram grammar compiles")
});

static LANGUAGE: Lazy<Language> = Lazy::new(|| {
    language_handle()
        .load()
        .expect("bundled activity diagram artifact loads")
});

/// Handle to the compiled activity diagram grammar
pub fn language_handle() -> LanguageHandle {
    LanguageHandle::from_static(ARTIFACT.as_slice())
}

pub fn language() -> Language {
    LANGUAGE.clone()
}

fn comma_separated_list(rule: Rule) -> Rule {
    seq([rule.clone(), repeat(seq([string(","), rule])), optional(string(","))])
}

/// `( text )` label
fn label() -> Rule {
    seq([string("("), sym("text_content"), string(")")])
}

fn condition_head(keyword: &str) -> Vec<Rule> {
    vec![
        string(keyword),
        optional(string("(")),
        field("expression", sym("expression")),
        optional(string(")")),
    ]
}

fn block() -> Rule {
    field("block_statement_list", sym("block_statement_list"))
}

fn statement_choice() -> Rule {
    choice([
        sym("if_statement"),
        sym("switch_statement"),
        sym("while_statement"),
        sym("repeat_statement"),
        sym("group_statement"),
        sym("terminal_statement"),
    ])
}

pub(crate) fn grammar() -> GrammarBuilder {
    let group_body = |open: Vec<Rule>, close: Vec<Rule>| {
        let mut items = vec![
            field("type", sym("group_type")),
            optional(field("name", sym("text_content"))),
            optional(field("color", sym("color_value"))),
        ];
        items.extend(open);
        items.push(block());
        items.extend(close);
        seq(items)
    };

    GrammarBuilder::new("activity_diagram")
        .extra(pattern(r"\s"))
        // ===== Document structure =====
        .rule(
            "document",
            seq([
                optional(sym("startuml_directive")),
                optional(string("start")),
                repeat1(sym("_top_statement")),
                optional(string("end")),
                optional(sym("enduml_directive")),
            ]),
        )
        .rule(
            "_top_statement",
            choice([
                sym("define_statement"),
                sym("if_statement"),
                sym("switch_statement"),
                sym("while_statement"),
                sym("repeat_statement"),
                sym("group_statement"),
                sym("terminal_statement"),
            ]),
        )
        .rule(
            "startuml_directive",
            prec_right(0, choice([seq([string("@startuml"), sym("text_content")]), string("@startuml")])),
        )
        .rule("enduml_directive", string("@enduml"))
        .rule(
            "define_statement",
            choice([
                sym("title_statement"),
                sym("skinparam"),
                sym("style_block"),
                sym("pragma"),
            ]),
        )
        // ===== Statements =====
        .rule(
            "terminal_statement",
            choice([
                sym("stop"),
                sym("break_statement"),
                sym("goto_statement"),
                sym("note_statement"),
                sym("arrow"),
                sym("action_statement"),
            ]),
        )
        .rule("stop", prec_right(2, seq([string("stop"), optional(string(";"))])))
        // ===== Conditionals =====
        .rule(
            "if_statement",
            seq([
                sym("if_condition"),
                repeat(sym("elseif_condition")),
                optional(sym("else_condition")),
                sym("endif_directive"),
            ]),
        )
        .rule(
            "endif_directive",
            choice([string("endif"), seq([string("end"), string("if")])]),
        )
        .rule("if_condition", {
            let mut items = condition_head("if");
            items.extend([optional(string("then")), optional(label()), block()]);
            seq(items)
        })
        .rule("elseif_condition", {
            let mut items = condition_head("elseif");
            items.extend([optional(string("then")), optional(label()), block()]);
            seq(items)
        })
        .rule(
            "else_condition",
            seq([string("else"), optional(label()), block()]),
        )
        .rule("block_statement_list", repeat1(sym("_block_statement")))
        .rule("_block_statement", statement_choice())
        .rule("switch_statement", {
            let mut items = condition_head("switch");
            items.extend([
                optional(string(";")),
                repeat1(sym("case_clause")),
                sym("endswitch_directive"),
            ]);
            seq(items)
        })
        .rule(
            "endswitch_directive",
            choice([string("endswitch"), seq([string("end"), string("switch")])]),
        )
        .rule("case_clause", {
            let mut items = condition_head("case");
            items.push(block());
            seq(items)
        })
        // ===== Loops =====
        .rule(
            "repeat_statement",
            seq([string("repeat"), block(), sym("repeat_statement_end")]),
        )
        .rule("repeat_statement_end", seq(condition_head("repeatwhile")))
        .rule("while_statement", {
            let mut items = condition_head("while");
            items.extend([
                optional(seq([optional(string("is")), label()])),
                block(),
                sym("endwhile_directive"),
                optional(label()),
            ]);
            seq(items)
        })
        .rule(
            "endwhile_directive",
            choice([string("endwhile"), seq([string("end"), string("while")])]),
        )
        .rule("break_statement", string("break"))
        .rule(
            "goto_statement",
            prec_right(
                3,
                seq([
                    choice([
                        seq([string("label"), sym("identifier")]),
                        seq([string("goto"), sym("identifier")]),
                    ]),
                    optional(string(";")),
                ]),
            ),
        )
        // ===== Grouping =====
        .rule(
            "group_type",
            choice([
                string("group"),
                string("partition"),
                string("package"),
                string("rectangle"),
                string("card"),
            ]),
        )
        .rule(
            "group_statement",
            prec_right(
                0,
                choice([
                    group_body(vec![], vec![string("end"), field("type", sym("group_type"))]),
                    group_body(vec![string("{")], vec![string("}")]),
                ]),
            ),
        )
        .rule(
            "note_statement",
            seq([
                optional(string("floating")),
                string("note"),
                optional(field(
                    "position",
                    choice([string("left"), string("right"), string("top"), string("bottom")]),
                )),
                optional(string(":")),
                field("content", sym("text_content")),
                choice([string("endnote"), seq([string("end"), string("note")])]),
            ]),
        )
        // ===== Arrows =====
        .rule(
            "arrow",
            seq([field("arrow", sym("arrow_style")), sym("action_statement")]),
        )
        .rule(
            "arrow_style",
            choice([
                string("->"),
                string("-->"),
                seq([
                    string("-"),
                    string("["),
                    sym("arrow_properties"),
                    string("]"),
                    string("->"),
                ]),
                seq([
                    string("-"),
                    string("["),
                    string("hidden"),
                    string("]"),
                    string("->"),
                ]),
            ]),
        )
        .rule("arrow_properties", comma_separated_list(sym("arrow_property_element")))
        .rule(
            "arrow_property_element",
            choice([
                sym("color_value"),
                string("bold"),
                string("dashed"),
                string("dotted"),
            ]),
        )
        // ===== Styling and metadata =====
        .rule(
            "title_statement",
            seq([
                string("title"),
                field("text", sym("text_content")),
                optional(string(";")),
            ]),
        )
        .rule(
            "skinparam",
            seq([
                string("skinparam"),
                field("element", sym("identifier")),
                field("property", sym("identifier")),
                field("value", sym("skinparam_value")),
                optional(string(";")),
            ]),
        )
        .rule(
            "skinparam_value",
            choice([sym("color_value"), sym("text_content"), sym("identifier")]),
        )
        .rule(
            "style_block",
            seq([string("<style>"), repeat(sym("style_rule")), string("</style>")]),
        )
        .rule(
            "style_rule",
            seq([
                field("selector", sym("identifier")),
                string("{"),
                repeat(sym("style_property")),
                string("}"),
            ]),
        )
        .rule(
            "style_property",
            seq([
                field("property", sym("identifier")),
                string(":"),
                field("value", sym("text_content")),
                string(";"),
            ]),
        )
        .rule(
            "pragma",
            seq([
                string("!pragma"),
                field("name", sym("identifier")),
                optional(seq([
                    field("operator", choice([string("="), string("on"), string("off")])),
                    field("value", sym("text_content")),
                ])),
            ]),
        )
        // ===== Expressions and values =====
        .rule(
            "expression",
            choice([
                seq([
                    string("activity"),
                    field("activity_identifier", sym("identifier")),
                ]),
                field("expression_content", sym("text_content")),
            ]),
        )
        .rule("text_content", repeat1(sym("text_word")))
        .rule("text_word", prec(-1, token(pattern(r"[^ \t\n\r,;{}()]+"))))
        .rule(
            "action_statement",
            seq([
                string(":"),
                field("action", sym("text_content")),
                string(";"),
            ]),
        )
        .rule("identifier", pattern("[a-zA-Z_][a-zA-Z0-9_]*"))
        .rule(
            "color_value",
            choice([
                seq([sym("color_value_item"), string("/"), sym("color_value_item")]),
                seq([sym("color_value_item"), string("\\"), sym("color_value_item")]),
                sym("color_value_item"),
            ]),
        )
        .rule(
            "color_value_item",
            choice([pattern("#[0-9A-Fa-f]{3,6}"), pattern("[a-zA-Z]+")]),
        )
}
