//! Script front end over `rustpython-parser`
//!
//! Parsing yields the module body plus a line index that maps node offsets
//! back to 1-based lines for error reports. Bracket nesting is bounded on
//! the token stream before the parser builds any tree.

use std::rc::Rc;

use rustpython_parser::ast::{self, Ranged};
use rustpython_parser::{lexer, parse, Mode, Tok};

use crate::error::{ErrorKind, ScriptError};

/// Bracket depth at which a script is rejected
pub const MAX_NESTING: usize = 200;

/// Byte offsets where each line starts
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, ch) in source.char_indices() {
            if ch == '\n' {
                line_starts.push(i + 1);
            }
        }
        Self { line_starts }
    }

    /// 1-based line containing `offset`
    pub fn line_of(&self, offset: usize) -> usize {
        match self.line_starts.binary_search(&offset) {
            Ok(line) => line + 1,
            Err(line) => line,
        }
    }

    /// Line a node starts on
    pub fn line_at<T: Ranged>(&self, node: &T) -> usize {
        self.line_of(node.range().start().to_usize())
    }
}

/// Parsed module body with its line index
#[derive(Debug)]
pub struct Program {
    pub body: Vec<ast::Stmt>,
    pub lines: Rc<LineIndex>,
}

/// Parse `source` as a module; `origin` names it in parser diagnostics
pub fn parse_program(source: &str, origin: &str) -> Result<Program, ScriptError> {
    let lines = Rc::new(LineIndex::new(source));
    check_nesting(source, &lines)?;

    match parse(source, Mode::Module, origin) {
        Ok(ast::Mod::Module(module)) => Ok(Program {
            body: module.body,
            lines,
        }),
        Ok(_) => Err(ScriptError::new(ErrorKind::Syntax, "expected a module")),
        Err(err) => Err(ScriptError::new(ErrorKind::Syntax, err.error.to_string())
            .at_line(lines.line_of(err.offset.to_usize()))),
    }
}

fn check_nesting(source: &str, lines: &LineIndex) -> Result<(), ScriptError> {
    let mut depth = 0usize;
    for token in lexer::lex(source, Mode::Module) {
        // Lexical errors are reported by the parser
        let Ok((tok, range)) = token else { break };
        match tok {
            Tok::Lpar | Tok::Lsqb | Tok::Lbrace => {
                depth += 1;
                if depth >= MAX_NESTING {
                    return Err(ScriptError::new(ErrorKind::Syntax, "too many nested parentheses")
                        .at_line(lines.line_of(range.start().to_usize())));
                }
            }
            Tok::Rpar | Tok::Rsqb | Tok::Rbrace => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_index() {
        let index = LineIndex::new("a = 1\nb = 2\n\nc");
        assert_eq!(index.line_of(0), 1);
        assert_eq!(index.line_of(4), 1);
        assert_eq!(index.line_of(6), 2);
        assert_eq!(index.line_of(13), 4);
    }

    #[test]
    fn test_statements_know_their_lines() {
        let program = parse_program("x = 1\nif x:\n    y = 2\nz = 3", "<test>").unwrap();
        let lines: Vec<usize> = program.body.iter().map(|s| program.lines.line_at(s)).collect();
        assert_eq!(lines, vec![1, 2, 4]);
    }

    #[test]
    fn test_syntax_errors_carry_a_line() {
        let err = parse_program("x = 1\ndef f(:\n    pass", "<test>").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Syntax);
        assert_eq!(err.line, Some(2));
    }

    #[test]
    fn test_nesting_is_bounded() {
        let nested = |n: usize| format!("{}1{}", "(".repeat(n), ")".repeat(n));
        assert!(parse_program(&nested(MAX_NESTING - 1), "<test>").is_ok());

        for n in [MAX_NESTING, 1_000, 20_000] {
            let err = parse_program(&nested(n), "<test>").unwrap_err();
            assert_eq!(err.kind, ErrorKind::Syntax);
            assert!(err.message.contains("nested"));
        }

        let lists = format!("{}{}", "[".repeat(5_000), "]".repeat(5_000));
        assert_eq!(parse_program(&lists, "<test>").unwrap_err().kind, ErrorKind::Syntax);
    }

    #[test]
    fn test_brackets_inside_strings_do_not_count() {
        let source = format!("s = '{}'", "(".repeat(1_000));
        assert!(parse_program(&source, "<test>").is_ok());
    }
}
