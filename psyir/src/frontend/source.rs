use crate::error::generation_error;
use crate::frontend::scanner::Scanner;
use crate::frontend::token::Token;
use crate::frontend::token::TokenKind;
use anyhow::Context;
use anyhow::Result;
use std::collections::HashMap;
use std::fmt::Display;
use std::fmt::Formatter;
use std::fs;
use std::path::Path;

/// The Fortran text of a kernel module as a lossless token stream.
///
/// Edits such as renaming operate on the tokens so that everything else in
/// the file (layout, comments, case) is kept as written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KernelSource {
    tokens: Vec<Token>,
}

impl KernelSource {
    pub fn parse(src: &str) -> Result<KernelSource> {
        let mut tokens = Scanner::scan(src)?;
        tokens.retain(|t| t.kind != TokenKind::Eof);
        Ok(KernelSource { tokens })
    }
    pub fn read(path: &Path) -> Result<KernelSource> {
        let src = fs::read_to_string(path)
            .with_context(|| format!("Could not read kernel source {}", path.display()))?;
        Self::parse(&src)
    }
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }
    /// Indices of the significant tokens, grouped per statement.
    fn statements(&self) -> Vec<Vec<usize>> {
        let mut statements = vec![];
        let mut current = vec![];
        let mut continued = false;
        for (i, token) in self.tokens.iter().enumerate() {
            match token.kind {
                TokenKind::Whitespace | TokenKind::Comment => {}
                TokenKind::Newline if continued => continued = false,
                TokenKind::Newline => statements.push(std::mem::take(&mut current)),
                _ if token.is_op(";") => statements.push(std::mem::take(&mut current)),
                _ if token.is_op("&") => continued = true,
                _ => {
                    continued = false;
                    current.push(i);
                }
            }
        }
        statements.push(current);
        statements.retain(|s| !s.is_empty());
        statements
    }
    fn is_word(&self, index: Option<&usize>, word: &str) -> bool {
        index.is_some_and(|&i| self.tokens[i].is_word(word))
    }
    fn is_op(&self, index: Option<&usize>, op: &str) -> bool {
        index.is_some_and(|&i| self.tokens[i].is_op(op))
    }
    fn lexeme(&self, index: Option<&usize>) -> Option<String> {
        index
            .filter(|&&i| self.tokens[i].kind == TokenKind::Identifier)
            .map(|&i| self.tokens[i].lexeme.clone())
    }
    pub fn module_name(&self) -> Option<String> {
        self.statements().into_iter().find_map(|s| {
            let is_module = self.is_word(s.first(), "module")
                && !self.is_word(s.get(1), "procedure")
                && !self.is_word(s.get(1), "subroutine");
            if is_module {
                self.lexeme(s.get(1))
            } else {
                None
            }
        })
    }
    /// Name of the derived type that binds `kernel` as a type-bound
    /// procedure.
    pub fn type_name(&self, kernel: &str) -> Option<String> {
        let mut current_type: Option<String> = None;
        for statement in self.statements() {
            let first = statement.first();
            if self.is_word(first, "endtype")
                || (self.is_word(first, "end") && self.is_word(statement.get(1), "type"))
            {
                current_type = None;
            } else if self.is_word(first, "type") && !self.is_op(statement.get(1), "(") {
                let name = match statement.iter().position(|&i| self.tokens[i].is_op("::")) {
                    Some(colons) => statement.get(colons + 1),
                    None => statement.get(1),
                };
                current_type = self.lexeme(name);
            } else if let Some(type_name) = &current_type {
                let is_binding = self.is_word(first, "procedure")
                    && statement
                        .iter()
                        .skip(1)
                        .any(|&i| self.tokens[i].is_word(kernel));
                if is_binding {
                    return Some(type_name.clone());
                }
            }
        }
        None
    }
    /// Replace every identifier whose lowercase form is a key of `renames`.
    pub fn rename(&mut self, renames: &HashMap<String, String>) {
        for token in self.tokens.iter_mut() {
            if token.kind != TokenKind::Identifier {
                continue;
            }
            if let Some(new) = renames.get(&token.lexeme.to_lowercase()) {
                token.lexeme = new.clone();
            }
        }
    }
    fn is_subroutine_header(&self, statement: &[usize], kernel: &str) -> bool {
        let keyword = statement
            .iter()
            .position(|&i| self.tokens[i].is_word("subroutine"));
        match keyword {
            Some(k) => {
                !self.is_word(statement.first(), "end")
                    && self.is_word(statement.get(k + 1), kernel)
            }
            None => false,
        }
    }
    fn is_subroutine_end(&self, statement: &[usize]) -> bool {
        self.is_word(statement.first(), "endsubroutine")
            || (self.is_word(statement.first(), "end")
                && self.is_word(statement.get(1), "subroutine"))
    }
    /// Index of the first token on the line of token `index`.
    fn line_start(&self, index: usize) -> usize {
        self.tokens[..index]
            .iter()
            .rposition(|t| t.kind == TokenKind::Newline)
            .map(|i| i + 1)
            .unwrap_or(0)
    }
    /// Index of the newline that ends the line of token `index`.
    fn line_end(&self, index: usize) -> Option<usize> {
        self.tokens[index..]
            .iter()
            .position(|t| t.kind == TokenKind::Newline)
            .map(|i| index + i)
    }
    /// Text of the subroutine `kernel` from its header line up to and
    /// including its `end subroutine` line.
    pub fn subroutine_text(&self, kernel: &str) -> Option<String> {
        let statements = self.statements();
        let header = statements
            .iter()
            .position(|s| self.is_subroutine_header(s, kernel))?;
        let end = statements[header..]
            .iter()
            .find(|s| self.is_subroutine_end(s))?;
        let first = self.line_start(statements[header][0]);
        let last = end[end.len() - 1];
        let last = self.line_end(last).unwrap_or(self.tokens.len() - 1);
        let text = self.tokens[first..=last]
            .iter()
            .map(|t| t.lexeme.as_str())
            .collect();
        Some(text)
    }
    /// Insert `line` directly after the `subroutine` statement of `kernel`.
    pub fn insert_after_subroutine(&mut self, kernel: &str, line: &str) -> Result<()> {
        let header = self
            .statements()
            .into_iter()
            .find(|s| self.is_subroutine_header(s, kernel))
            .ok_or_else(|| {
                generation_error!("Could not find subroutine '{kernel}' in the kernel source")
            })?;
        let first = header[0];
        let last = header[header.len() - 1];
        let line_start = self.line_start(first);
        let indent = match self.tokens.get(line_start) {
            Some(t) if t.kind == TokenKind::Whitespace => t.lexeme.clone(),
            _ => String::new(),
        };
        let newline = self.line_end(last);
        let text = match newline {
            Some(_) => format!("{indent}  {line}\n"),
            None => format!("\n{indent}  {line}\n"),
        };
        let mut inserted = Scanner::scan(&text)?;
        inserted.retain(|t| t.kind != TokenKind::Eof);
        let at = match newline {
            Some(i) => i + 1,
            None => self.tokens.len(),
        };
        self.tokens.splice(at..at, inserted);
        Ok(())
    }
}

impl Display for KernelSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for token in &self.tokens {
            write!(f, "{}", token.lexeme)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    const KERNEL: &str = indoc! {"
        module testkern_mod
          type, extends(kernel_type) :: testkern_type
          contains
            procedure, nopass :: code => testkern_code
          end type testkern_type
        contains
          subroutine testkern_code(a)
            real, intent(inout) :: a ! TestKern_Code
            a = 1.0
          end subroutine testkern_code
        end module testkern_mod
    "};

    #[test]
    fn test_lossless() {
        let source = KernelSource::parse(KERNEL).unwrap();
        assert_eq!(source.to_string(), KERNEL);
        assert_eq!(source.module_name().unwrap(), "testkern_mod");
        assert_eq!(source.type_name("TESTKERN_CODE").unwrap(), "testkern_type");
        assert_eq!(source.type_name("other_code"), None);
    }

    #[test]
    fn test_rename() {
        let mut source = KernelSource::parse(KERNEL).unwrap();
        let mut renames = HashMap::new();
        renames.insert("testkern_code".to_string(), "testkern_0_code".to_string());
        renames.insert("testkern_mod".to_string(), "testkern_0_mod".to_string());
        source.rename(&renames);
        let text = source.to_string();
        assert!(text.contains("module testkern_0_mod\n"));
        assert!(text.contains("procedure, nopass :: code => testkern_0_code"));
        assert!(text.contains("end subroutine testkern_0_code"));
        // Comments are not identifiers.
        assert!(text.contains("! TestKern_Code"));
    }

    #[test]
    fn test_insert_after_subroutine() {
        let mut source = KernelSource::parse(KERNEL).unwrap();
        source
            .insert_after_subroutine("testkern_code", "!$acc routine")
            .unwrap();
        let text = source.to_string();
        let expected = "  subroutine testkern_code(a)\n    !$acc routine\n    real, intent";
        assert!(text.contains(expected));
        let err = source
            .insert_after_subroutine("missing_code", "!$acc routine")
            .unwrap_err();
        assert!(err.to_string().contains("Could not find subroutine"));
    }

    #[test]
    fn test_subroutine_text() {
        let source = KernelSource::parse(KERNEL).unwrap();
        let expected = "  subroutine testkern_code(a)\n    real, intent(inout) :: a ! \
                        TestKern_Code\n    a = 1.0\n  end subroutine testkern_code\n";
        assert_eq!(source.subroutine_text("testkern_code").unwrap(), expected);
        assert_eq!(source.subroutine_text("missing_code"), None);
    }
}
