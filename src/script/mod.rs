//! Embedded engine for UMD-style payload scripts.
//!
//! A tree-walking ES2020 interpreter sized for what bundlers emit: classes,
//! destructuring, spread, iterators, promises, tagged templates, regular
//! expressions and the standard library those need. Each [`Realm`] owns its
//! own global object and intrinsics. Payloads run as a function body whose
//! parameters are the injected scope names.
//!
//! Not supported: generators, `async`/`await`, `with`, and regular
//! expression backreferences or lookaround.

pub mod ast;
pub mod builtins;
pub mod env;
pub mod interpreter;
pub mod lexer;
pub mod object;
pub mod parser;
pub mod realm;
pub mod value;

pub use interpreter::{Interpreter, Limits};
pub use object::ObjectRef;
pub use parser::parse;
pub use realm::Realm;
pub use value::Value;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScriptError {
    #[error("SyntaxError: {message} (at {line}:{column})")]
    Syntax {
        message: String,
        line: usize,
        column: usize,
    },
    /// An exception escaped the payload; carries the thrown value's string form.
    #[error("{0}")]
    Uncaught(String),
    #[error("execution budget of {0} steps exhausted")]
    BudgetExhausted(u64),
}

impl ScriptError {
    pub fn syntax(source: &str, offset: usize, message: String) -> Self {
        let prefix = &source[..offset.min(source.len())];
        let line = prefix.matches('\n').count() + 1;
        let column = prefix
            .rfind('\n')
            .map_or(prefix.chars().count(), |nl| prefix[nl + 1..].chars().count())
            + 1;
        ScriptError::Syntax {
            message,
            line,
            column,
        }
    }
}

/// Minimum stack to keep free before recursing further.
const RED_ZONE: usize = 100 * 1024;
/// Stack allocated per growth step.
const STACK_PER_RECURSION: usize = 1024 * 1024;

/// Grows the stack on demand so deeply nested payloads cannot overflow it.
#[inline]
pub(crate) fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syntax_positions_are_one_based() {
        let err = ScriptError::syntax("a\nbc d", 5, "oops".into());
        assert_eq!(
            err,
            ScriptError::Syntax {
                message: "oops".into(),
                line: 2,
                column: 4,
            }
        );
    }
}
