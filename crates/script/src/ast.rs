//! Spanned AST for user scripts.

use pest::iterators::Pair;
use pest::Parser as _;
use smol_str::SmolStr;

use opscript_ir::{SourceLoc, Span, U256};

use crate::error::Error;
use crate::syntax::{Rule, ScriptParser};

#[derive(Debug)]
pub struct Program {
    pub stmts: Vec<Stmt>,
}

#[derive(Debug)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug)]
pub enum StmtKind {
    /// `const NAME = expr`
    Const(SmolStr, Expr),
    /// `NAME = expr`
    Assign(SmolStr, Expr),
    /// `[a, b, c] = expr`
    Destructure(Vec<SmolStr>, Expr),
    Expr(Expr),
}

#[derive(Debug)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
    pub loc: SourceLoc,
}

#[derive(Debug)]
pub enum ExprKind {
    Call(SmolStr, Vec<Expr>),
    /// `{ "sig": expr, ... }`, insertion order preserved.
    Object(Vec<(SmolStr, Expr)>),
    Str(SmolStr),
    Int(U256),
    Bool(bool),
    Ident(SmolStr),
}

pub fn parse(input: &str) -> Result<Program, Error> {
    let mut pairs = ScriptParser::parse(Rule::program, input)
        .map_err(|err| Error::Syntax(Box::new(err)))?;
    let program = pairs.next().expect("grammar yields one program node");
    debug_assert_eq!(program.as_rule(), Rule::program);

    let mut stmts = Vec::new();
    for pair in program.into_inner() {
        match pair.as_rule() {
            Rule::stmt => stmts.push(stmt(pair)?),
            Rule::EOI => {}
            rule => unreachable!("unexpected rule under program: {rule:?}"),
        }
    }
    Ok(Program { stmts })
}

fn stmt(pair: Pair<'_, Rule>) -> Result<Stmt, Error> {
    let span = span_of(&pair);
    let inner = pair.into_inner().next().expect("stmt has a body");
    let kind = match inner.as_rule() {
        Rule::const_decl => {
            let mut parts = inner.into_inner();
            let _kw = parts.next();
            let name = ident_text(parts.next().expect("const name"));
            let value = expr(parts.next().expect("const value"))?;
            StmtKind::Const(name, value)
        }
        Rule::destructure => {
            let mut names = Vec::new();
            let mut value = None;
            for part in inner.into_inner() {
                match part.as_rule() {
                    Rule::kw_const => {}
                    Rule::ident => names.push(ident_text(part)),
                    Rule::expr => value = Some(expr(part)?),
                    rule => unreachable!("unexpected rule under destructure: {rule:?}"),
                }
            }
            StmtKind::Destructure(names, value.expect("destructure value"))
        }
        Rule::assign => {
            let mut parts = inner.into_inner();
            let name = ident_text(parts.next().expect("assign name"));
            let value = expr(parts.next().expect("assign value"))?;
            StmtKind::Assign(name, value)
        }
        Rule::expr => StmtKind::Expr(expr(inner)?),
        rule => unreachable!("unexpected rule under stmt: {rule:?}"),
    };
    Ok(Stmt { kind, span })
}

fn expr(pair: Pair<'_, Rule>) -> Result<Expr, Error> {
    debug_assert_eq!(pair.as_rule(), Rule::expr);
    let inner = pair.into_inner().next().expect("expr has a body");
    let span = span_of(&inner);
    let loc = loc_of(&inner);
    let kind = match inner.as_rule() {
        Rule::call => {
            let mut parts = inner.into_inner();
            let callee = SmolStr::new(parts.next().expect("callee").as_str());
            let mut args = Vec::new();
            if let Some(list) = parts.next() {
                for arg in list.into_inner() {
                    args.push(expr(arg)?);
                }
            }
            ExprKind::Call(callee, args)
        }
        Rule::object => {
            let mut entries = Vec::new();
            for entry in inner.into_inner() {
                let mut parts = entry.into_inner();
                let key = string_text(parts.next().expect("object key"));
                let value = expr(parts.next().expect("object value"))?;
                entries.push((key, value));
            }
            ExprKind::Object(entries)
        }
        Rule::string => ExprKind::Str(string_text(inner)),
        Rule::number => ExprKind::Int(number_value(&inner, span)?),
        Rule::boolean => ExprKind::Bool(inner.as_str() == "true"),
        Rule::ident => ExprKind::Ident(SmolStr::new(inner.as_str())),
        rule => unreachable!("unexpected rule under expr: {rule:?}"),
    };
    Ok(Expr { kind, span, loc })
}

fn number_value(pair: &Pair<'_, Rule>, span: Span) -> Result<U256, Error> {
    let text = pair.as_str();
    if let Some(digits) = text.strip_prefix("0x") {
        U256::from_str_radix(digits, 16).map_err(|_| Error::NumberOutOfBounds(span))
    } else {
        U256::from_dec_str(text.trim_end_matches('n')).map_err(|_| Error::NumberOutOfBounds(span))
    }
}

fn ident_text(pair: Pair<'_, Rule>) -> SmolStr {
    debug_assert_eq!(pair.as_rule(), Rule::ident);
    SmolStr::new(pair.as_str())
}

/// Strips the quotes and processes the usual escapes.
fn string_text(pair: Pair<'_, Rule>) -> SmolStr {
    debug_assert_eq!(pair.as_rule(), Rule::string);
    let raw = pair.as_str();
    let body = &raw[1..raw.len() - 1];
    if !body.contains('\\') {
        return SmolStr::new(body);
    }
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    SmolStr::new(out)
}

fn span_of(pair: &Pair<'_, Rule>) -> Span {
    let s = pair.as_span();
    Span::from_range(s.start()..s.end())
}

fn loc_of(pair: &Pair<'_, Rule>) -> SourceLoc {
    let (line, col) = pair.as_span().start_pos().line_col();
    SourceLoc {
        line: line as u32,
        col: col as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statements_parse() {
        let program = parse(
            r#"
            // entry
            $("deployable", true)
            const TIMES = 5;
            push(0)
            mainloop = push(1)
            [a, b] = allocStack(2)
            jumpi(mainloop); stop()
            "#,
        )
        .unwrap();
        assert_eq!(program.stmts.len(), 7);
        assert!(matches!(program.stmts[1].kind, StmtKind::Const(..)));
        assert!(matches!(program.stmts[3].kind, StmtKind::Assign(..)));
        assert!(matches!(program.stmts[4].kind, StmtKind::Destructure(..)));
    }

    #[test]
    fn nested_calls_and_objects() {
        let program = parse(
            r#"dispatch({ "function foo(address a)": $ptr("tag"), "bar()": $ptr("other") })"#,
        )
        .unwrap();
        let StmtKind::Expr(expr) = &program.stmts[0].kind else {
            panic!("expected expression statement");
        };
        let ExprKind::Call(name, args) = &expr.kind else {
            panic!("expected call");
        };
        assert_eq!(name, "dispatch");
        assert!(matches!(args[0].kind, ExprKind::Object(ref entries) if entries.len() == 2));
    }

    #[test]
    fn numbers() {
        let program = parse("push(0n); push(0x1F); push(255)").unwrap();
        let ints: Vec<U256> = program
            .stmts
            .iter()
            .map(|s| {
                let StmtKind::Expr(e) = &s.kind else { unreachable!() };
                let ExprKind::Call(_, args) = &e.kind else { unreachable!() };
                let ExprKind::Int(v) = &args[0].kind else { unreachable!() };
                *v
            })
            .collect();
        assert_eq!(ints, vec![U256::zero(), U256::from(0x1F), U256::from(255)]);
    }

    #[test]
    fn call_locations_are_one_based() {
        let program = parse("push(1)\njump($ptr(\"x\"))").unwrap();
        let StmtKind::Expr(second) = &program.stmts[1].kind else {
            unreachable!()
        };
        assert_eq!(second.loc.line, 2);
        assert_eq!(second.loc.col, 1);
    }

    #[test]
    fn junk_is_a_syntax_error() {
        assert!(matches!(parse("push(1) ???"), Err(Error::Syntax(_))));
    }
}
