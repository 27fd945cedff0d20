use super::ScriptError;
use super::value::JsStr;
use logos::Logos;
use std::ops::Range;
use std::sync::Arc;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f\u{0b}\u{a0}\u{feff}\u{2028}\u{2029}]+")]
pub enum Tok {
    #[regex(r"//[^\n]*", logos::skip)]
    LineComment,
    #[regex(r"/\*([^*]|\*+[^*/])*\*+/", logos::skip)]
    BlockComment,

    // Keywords
    #[token("var")]
    Var,
    #[token("let")]
    Let,
    #[token("const")]
    Const,
    #[token("function")]
    Function,
    #[token("return")]
    Return,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("while")]
    While,
    #[token("do")]
    Do,
    #[token("for")]
    For,
    #[token("in")]
    In,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("switch")]
    Switch,
    #[token("case")]
    Case,
    #[token("default")]
    Default,
    #[token("throw")]
    Throw,
    #[token("try")]
    Try,
    #[token("catch")]
    Catch,
    #[token("finally")]
    Finally,
    #[token("new")]
    New,
    #[token("delete")]
    Delete,
    #[token("typeof")]
    Typeof,
    #[token("void")]
    Void,
    #[token("instanceof")]
    Instanceof,
    #[token("this")]
    This,
    #[token("super")]
    Super,
    #[token("class")]
    Class,
    #[token("extends")]
    Extends,
    #[token("null")]
    Null,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("debugger")]
    Debugger,
    #[token("with")]
    With,

    // Punctuation
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(";")]
    Semi,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("...")]
    Ellipsis,
    #[token("?")]
    Question,
    #[token(":")]
    Colon,
    #[token("=>")]
    FatArrow,
    #[token("`")]
    Backtick,

    // Operators
    #[token("=")]
    Assign,
    #[token("+=")]
    PlusAssign,
    #[token("-=")]
    MinusAssign,
    #[token("*=")]
    StarAssign,
    #[token("/=")]
    SlashAssign,
    #[token("%=")]
    PercentAssign,
    #[token("**=")]
    StarStarAssign,
    #[token("<<=")]
    ShlAssign,
    #[token(">>=")]
    ShrAssign,
    #[token(">>>=")]
    UShrAssign,
    #[token("&=")]
    AmpAssign,
    #[token("|=")]
    PipeAssign,
    #[token("^=")]
    CaretAssign,
    #[token("&&=")]
    AndAssign,
    #[token("||=")]
    OrAssign,
    #[token("??=")]
    NullishAssign,
    #[token("==")]
    EqEq,
    #[token("===")]
    EqEqEq,
    #[token("!=")]
    NotEq,
    #[token("!==")]
    NotEqEq,
    #[token("<")]
    Lt,
    #[token("<=")]
    LtEq,
    #[token(">")]
    Gt,
    #[token(">=")]
    GtEq,
    #[token("<<")]
    Shl,
    #[token(">>")]
    Shr,
    #[token(">>>")]
    UShr,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("**")]
    StarStar,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("++")]
    PlusPlus,
    #[token("--")]
    MinusMinus,
    #[token("!")]
    Bang,
    #[token("~")]
    Tilde,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("??")]
    NullishCoalesce,

    // Literals
    #[regex(r"([0-9][0-9_]*(\.[0-9_]*)?|\.[0-9][0-9_]*)([eE][+-]?[0-9_]+)?", decimal)]
    #[regex(r"0[xX][0-9a-fA-F_]+", |lex| radix(lex.slice(), 16))]
    #[regex(r"0[oO][0-7_]+", |lex| radix(lex.slice(), 8))]
    #[regex(r"0[bB][01_]+", |lex| radix(lex.slice(), 2))]
    Number(f64),

    #[regex(r#""([^"\\\n]|\\[\s\S])*""#, |lex| unescape(lex.slice()))]
    #[regex(r#"'([^'\\\n]|\\[\s\S])*'"#, |lex| unescape(lex.slice()))]
    Str(JsStr),

    #[regex(r"[\p{XID_Start}_$][\p{XID_Continue}$\u{200c}\u{200d}]*", |lex| JsStr::from(lex.slice()))]
    Ident(JsStr),

    #[regex(r"#[\p{XID_Start}_$][\p{XID_Continue}$\u{200c}\u{200d}]*", |lex| JsStr::from(&lex.slice()[1..]))]
    PrivateName(JsStr),

    /// Built by [`tokenize`] from a backtick; never matched by logos.
    Template(Arc<TemplateToken>),
    /// Built by [`tokenize`] where a `/` starts an expression.
    Regex(RegexLiteral),

    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegexLiteral {
    pub pattern: JsStr,
    pub flags: JsStr,
}

/// A template literal with its substitutions already tokenized.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateToken {
    pub cooked: Vec<Option<JsStr>>,
    pub raw: Vec<JsStr>,
    /// One token stream per `${…}`, each ending in [`Tok::Eof`].
    pub exprs: Vec<Vec<Token>>,
}

impl Tok {
    /// Keywords are valid property names after `.` and as object literal keys.
    pub fn as_property_name(&self) -> Option<&'static str> {
        Some(match self {
            Tok::Var => "var",
            Tok::Let => "let",
            Tok::Const => "const",
            Tok::Function => "function",
            Tok::Return => "return",
            Tok::If => "if",
            Tok::Else => "else",
            Tok::While => "while",
            Tok::Do => "do",
            Tok::For => "for",
            Tok::In => "in",
            Tok::Break => "break",
            Tok::Continue => "continue",
            Tok::Switch => "switch",
            Tok::Case => "case",
            Tok::Default => "default",
            Tok::Throw => "throw",
            Tok::Try => "try",
            Tok::Catch => "catch",
            Tok::Finally => "finally",
            Tok::New => "new",
            Tok::Delete => "delete",
            Tok::Typeof => "typeof",
            Tok::Void => "void",
            Tok::Instanceof => "instanceof",
            Tok::This => "this",
            Tok::Super => "super",
            Tok::Class => "class",
            Tok::Extends => "extends",
            Tok::Null => "null",
            Tok::True => "true",
            Tok::False => "false",
            Tok::Debugger => "debugger",
            Tok::With => "with",
            _ => return None,
        })
    }

    /// Whether a `/` after this token divides rather than starts a regex.
    fn ends_expression(&self) -> bool {
        matches!(
            self,
            Tok::Ident(_)
                | Tok::PrivateName(_)
                | Tok::Number(_)
                | Tok::Str(_)
                | Tok::Template(_)
                | Tok::Regex(_)
                | Tok::RParen
                | Tok::RBracket
                | Tok::This
                | Tok::Super
                | Tok::Null
                | Tok::True
                | Tok::False
                | Tok::PlusPlus
                | Tok::MinusMinus
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub span: Range<usize>,
    /// A line terminator sits between this token and the previous one.
    pub newline_before: bool,
}

pub fn tokenize(source: &str) -> Result<Vec<Token>, ScriptError> {
    let start = if source.starts_with("#!") {
        source.find('\n').unwrap_or(source.len())
    } else {
        0
    };
    let (mut tokens, end) = lex_from(source, start, false)?;
    let last_end = tokens.last().map_or(start, |t| t.span.end);
    tokens.push(Token {
        tok: Tok::Eof,
        span: end..end,
        newline_before: has_line_break(&source[last_end..]),
    });
    Ok(tokens)
}

fn has_line_break(gap: &str) -> bool {
    gap.contains(['\n', '\r', '\u{2028}', '\u{2029}'])
}

/// Lexes `source[offset..]`. With `substitution` set, stops after the `}`
/// that closes a template `${` and returns the offset past it.
fn lex_from(
    source: &str,
    offset: usize,
    substitution: bool,
) -> Result<(Vec<Token>, usize), ScriptError> {
    let mut tokens: Vec<Token> = Vec::new();
    let mut lexer = Tok::lexer(&source[offset..]);
    let mut last_end = offset;
    let mut depth = 0usize;

    while let Some(result) = lexer.next() {
        let local = lexer.span();
        let span = local.start + offset..local.end + offset;
        let mut tok = match result {
            Ok(tok) => tok,
            Err(_) => {
                return Err(ScriptError::syntax(
                    source,
                    span.start,
                    format!("Invalid or unexpected token '{}'", &source[span]),
                ));
            }
        };
        let mut end = span.end;
        match tok {
            Tok::LBrace => depth += 1,
            Tok::RBrace if substitution && depth == 0 => return Ok((tokens, span.end)),
            Tok::RBrace => depth = depth.saturating_sub(1),
            Tok::Backtick => {
                let (template, template_end) = scan_template(source, span.end)?;
                tok = Tok::Template(Arc::new(template));
                end = template_end;
            }
            Tok::Slash | Tok::SlashAssign
                if !tokens.last().is_some_and(|prev| prev.tok.ends_expression()) =>
            {
                let (regex, regex_end) = scan_regex(source, span.start)?;
                tok = regex;
                end = regex_end;
            }
            _ => {}
        }
        if end > span.end {
            lexer.bump(end - span.end);
        }
        tokens.push(Token {
            tok,
            newline_before: has_line_break(&source[last_end..span.start]),
            span: span.start..end,
        });
        last_end = end;
    }

    if substitution {
        return Err(ScriptError::syntax(
            source,
            source.len(),
            "Unterminated template literal".into(),
        ));
    }
    Ok((tokens, source.len()))
}

/// Scans a template body starting just past the opening backtick.
fn scan_template(source: &str, start: usize) -> Result<(TemplateToken, usize), ScriptError> {
    let mut template = TemplateToken {
        cooked: Vec::new(),
        raw: Vec::new(),
        exprs: Vec::new(),
    };
    let bytes = source.as_bytes();
    let mut pos = start;
    let mut chunk_start = start;
    loop {
        match bytes.get(pos) {
            None => {
                return Err(ScriptError::syntax(
                    source,
                    start - 1,
                    "Unterminated template literal".into(),
                ));
            }
            Some(b'\\') => pos += 2,
            Some(b'`') => {
                push_template_chunk(&mut template, &source[chunk_start..pos]);
                return Ok((template, pos + 1));
            }
            Some(b'$') if bytes.get(pos + 1) == Some(&b'{') => {
                push_template_chunk(&mut template, &source[chunk_start..pos]);
                let (mut tokens, after) = lex_from(source, pos + 2, true)?;
                tokens.push(Token {
                    tok: Tok::Eof,
                    span: after - 1..after - 1,
                    newline_before: false,
                });
                template.exprs.push(tokens);
                pos = after;
                chunk_start = after;
            }
            Some(_) => pos += 1,
        }
    }
}

fn push_template_chunk(template: &mut TemplateToken, raw: &str) {
    let raw = raw.replace("\r\n", "\n").replace('\r', "\n");
    template.cooked.push(cook(&raw).map(JsStr::from));
    template.raw.push(raw.into());
}

/// Scans `/pattern/flags` starting at the opening slash.
fn scan_regex(source: &str, start: usize) -> Result<(Tok, usize), ScriptError> {
    let bytes = source.as_bytes();
    let mut pos = start + 1;
    let mut in_class = false;
    loop {
        match bytes.get(pos) {
            None | Some(b'\n') | Some(b'\r') => {
                return Err(ScriptError::syntax(
                    source,
                    start,
                    "Invalid regular expression: missing /".into(),
                ));
            }
            Some(b'\\') => pos += 2,
            Some(b'[') => {
                in_class = true;
                pos += 1;
            }
            Some(b']') => {
                in_class = false;
                pos += 1;
            }
            Some(b'/') if !in_class => break,
            Some(_) => pos += 1,
        }
    }
    let pattern = &source[start + 1..pos];
    let flags_start = pos + 1;
    let flags_len = source[flags_start..]
        .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$'))
        .unwrap_or(source.len() - flags_start);
    let end = flags_start + flags_len;
    Ok((
        Tok::Regex(RegexLiteral {
            pattern: pattern.into(),
            flags: source[flags_start..end].into(),
        }),
        end,
    ))
}

fn decimal(lex: &mut logos::Lexer<Tok>) -> Option<f64> {
    let text = lex.slice();
    if text.ends_with('_') || text.contains("__") {
        return None;
    }
    text.replace('_', "").parse().ok()
}

fn radix(text: &str, radix: u32) -> Option<f64> {
    super::value::parse_radix_digits(&text[2..].replace('_', ""), radix)
}

fn unescape(quoted: &str) -> Option<JsStr> {
    cook(&quoted[1..quoted.len() - 1]).map(JsStr::from)
}

/// Resolves escape sequences. `None` when an escape is malformed.
fn cook(inner: &str) -> Option<String> {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    let mut pending_high: Option<u16> = None;
    while let Some(c) = chars.next() {
        if c != '\\' {
            flush_surrogate(&mut out, &mut pending_high);
            out.push(c);
            continue;
        }
        let escaped = chars.next()?;
        if escaped == 'u' {
            let code = if chars.peek() == Some(&'{') {
                chars.next();
                let hex: String = chars.by_ref().take_while(|c| *c != '}').collect();
                u32::from_str_radix(&hex, 16).ok()?
            } else {
                let hex: String = chars.by_ref().take(4).collect();
                if hex.len() != 4 {
                    return None;
                }
                u32::from_str_radix(&hex, 16).ok()?
            };
            push_code_point(&mut out, &mut pending_high, code);
            continue;
        }
        flush_surrogate(&mut out, &mut pending_high);
        match escaped {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '0' if !chars.peek().is_some_and(char::is_ascii_digit) => out.push('\0'),
            'x' => {
                let hex: String = chars.by_ref().take(2).collect();
                let code = u32::from_str_radix(&hex, 16).ok()?;
                out.push(char::from_u32(code)?);
            }
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
            }
            '\n' | '\u{2028}' | '\u{2029}' => {}
            other => out.push(other),
        }
    }
    flush_surrogate(&mut out, &mut pending_high);
    Some(out)
}

fn push_code_point(out: &mut String, pending_high: &mut Option<u16>, code: u32) {
    match code {
        0xD800..=0xDBFF => {
            flush_surrogate(out, pending_high);
            *pending_high = Some(code as u16);
        }
        0xDC00..=0xDFFF => match pending_high.take() {
            Some(high) => {
                let combined = 0x10000 + ((u32::from(high) - 0xD800) << 10) + (code - 0xDC00);
                out.push(char::from_u32(combined).unwrap_or('\u{fffd}'));
            }
            None => out.push('\u{fffd}'),
        },
        _ => {
            flush_surrogate(out, pending_high);
            out.push(char::from_u32(code).unwrap_or('\u{fffd}'));
        }
    }
}

fn flush_surrogate(out: &mut String, pending_high: &mut Option<u16>) {
    if pending_high.take().is_some() {
        out.push('\u{fffd}');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Tok> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.tok)
            .collect()
    }

    fn ident(name: &str) -> Tok {
        Tok::Ident(name.into())
    }

    #[test]
    fn lexes_global_assignment() {
        assert_eq!(
            kinds("window.Foo = {x: 1};"),
            vec![
                ident("window"),
                Tok::Dot,
                ident("Foo"),
                Tok::Assign,
                Tok::LBrace,
                ident("x"),
                Tok::Colon,
                Tok::Number(1.0),
                Tok::RBrace,
                Tok::Semi,
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn keywords_win_over_identifiers_but_not_prefixes() {
        assert_eq!(
            kinds("typeof typeofx for forEach"),
            vec![
                Tok::Typeof,
                ident("typeofx"),
                Tok::For,
                ident("forEach"),
                Tok::Eof
            ]
        );
    }

    #[test]
    fn skips_comments_and_tracks_newlines() {
        let tokens = tokenize("a /* block\n */ // line\nb").unwrap();
        assert_eq!(tokens[0].tok, ident("a"));
        assert!(!tokens[0].newline_before);
        assert_eq!(tokens[1].tok, ident("b"));
        assert!(tokens[1].newline_before);
    }

    #[test]
    fn unescapes_both_quote_styles() {
        assert_eq!(
            kinds(r#"'it\'s' "aA\n" "\u{1F600}😀" 'a\
b'"#),
            vec![
                Tok::Str("it's".into()),
                Tok::Str("aA\n".into()),
                Tok::Str("😀😀".into()),
                Tok::Str("ab".into()),
                Tok::Eof
            ]
        );
    }

    #[test]
    fn number_forms() {
        assert_eq!(
            kinds("0x1f 1.5e2 .5 0b101 0o17 1_000"),
            vec![
                Tok::Number(31.0),
                Tok::Number(150.0),
                Tok::Number(0.5),
                Tok::Number(5.0),
                Tok::Number(15.0),
                Tok::Number(1000.0),
                Tok::Eof
            ]
        );
    }

    #[test]
    fn multi_character_operators() {
        assert_eq!(
            kinds("a >>>= b ** c ?? d ... e++ &&= f"),
            vec![
                ident("a"),
                Tok::UShrAssign,
                ident("b"),
                Tok::StarStar,
                ident("c"),
                Tok::NullishCoalesce,
                ident("d"),
                Tok::Ellipsis,
                ident("e"),
                Tok::PlusPlus,
                Tok::AndAssign,
                ident("f"),
                Tok::Eof
            ]
        );
    }

    #[test]
    fn slash_is_division_after_values_and_regex_elsewhere() {
        assert_eq!(
            kinds("a / b"),
            vec![ident("a"), Tok::Slash, ident("b"), Tok::Eof]
        );
        assert_eq!(
            kinds("x = /a[/]b/gi.test(y)")[2],
            Tok::Regex(RegexLiteral {
                pattern: "a[/]b".into(),
                flags: "gi".into()
            })
        );
    }

    #[test]
    fn templates_carry_tokenized_substitutions() {
        let tokens = kinds("`a${ {b: 1}.b }c${`x${y}`}`");
        let Tok::Template(template) = &tokens[0] else {
            panic!("expected template, got {:?}", tokens[0]);
        };
        assert_eq!(template.cooked, vec![Some("a".into()), Some("c".into()), Some("".into())]);
        assert_eq!(template.exprs.len(), 2);
        assert_eq!(template.exprs[0][0].tok, Tok::LBrace);
        assert!(matches!(template.exprs[1][0].tok, Tok::Template(_)));
        assert_eq!(tokens[1], Tok::Eof);
    }

    #[test]
    fn optional_dot_before_digit_stays_a_conditional() {
        assert_eq!(
            kinds("a?.5:1"),
            vec![
                ident("a"),
                Tok::Question,
                Tok::Number(0.5),
                Tok::Colon,
                Tok::Number(1.0),
                Tok::Eof
            ]
        );
    }

    #[test]
    fn unicode_identifiers_and_private_names() {
        assert_eq!(
            kinds("café #secret"),
            vec![ident("café"), Tok::PrivateName("secret".into()), Tok::Eof]
        );
    }

    #[test]
    fn rejects_stray_characters_and_open_templates() {
        let err = tokenize("let a = @;").unwrap_err();
        assert!(err.to_string().contains("Invalid or unexpected token"));
        let err = tokenize("`never closed").unwrap_err();
        assert!(err.to_string().contains("Unterminated template literal"));
    }
}
