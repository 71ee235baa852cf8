//! Turns a source string into an [`IsProgram`]: the line-oriented tokenizer
//! and per-token grammar for registers, immediates, and identifiers.
//!
//! Unlike a free-form grammar, this format is strictly one-statement-per-line,
//! so there's no need for [`nom`] to track multi-line position itself — line
//! numbers are tracked by the caller's `enumerate()` over the source's lines,
//! and `nom` only ever parses the content of a single line/token.

use crate::ast::{
    DataDecl, EnvWord, ImmSource, IsFunction, IsInstruction, IsProgram, Node,
    RegisterToken, StvarbDecl, TypeDecl,
};
use crate::error::{ParseError, SourceErrorWrapper, WithSource};
use nom::branch::alt;
use nom::bytes::complete::{tag, tag_no_case};
use nom::character::complete::{char, digit1, hex_digit1};
use nom::combinator::{all_consuming, eof, map, map_res, opt, recognize};
use nom::sequence::{pair, preceded, tuple};
use nom::IResult;

type TokResult<'a, T> = IResult<&'a str, T>;

/// Splits a line's content on `[ \t,]`, per the original format's tokenizing
/// rule, dropping empty tokens produced by repeated separators.
fn tokenize(content: &str) -> Vec<&str> {
    content
        .split(|c: char| c == ' ' || c == '\t' || c == ',')
        .filter(|tok| !tok.is_empty())
        .collect()
}

/// Strips a `;`-to-end-of-line comment, if present, without touching
/// anything before it (including leading whitespace, which callers use to
/// tell section headers apart from indented directives/instructions).
fn strip_comment(line: &str) -> &str {
    match line.find(';') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

/// Undoes the `%%` / `%#` escaping required of identifiers that want a
/// literal `%` or `#` in their name. Any other use of a bare `%`/`#` is
/// rejected, since those characters are otherwise reserved for register
/// tokens and data-index references.
fn unescape_identifier(token: &str) -> Result<String, ParseError> {
    let mut out = String::with_capacity(token.len());
    let mut chars = token.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '%' => match chars.next() {
                Some('%') => out.push('%'),
                Some('#') => out.push('#'),
                _ => return Err(ParseError::UnrecognizedEscape),
            },
            '#' => return Err(ParseError::UnrecognizedEscape),
            other => out.push(other),
        }
    }
    Ok(out)
}

fn env_word(input: &str) -> TokResult<'_, EnvWord> {
    alt((
        map(tag_no_case("(%env)"), |_| EnvWord::Env),
        map(tag_no_case("(%penv)"), |_| EnvWord::Penv),
        map(tag_no_case("(%tenv)"), |_| EnvWord::Tenv),
    ))(input)
}

/// Tries each register form in turn. The first four alternatives are
/// terminated with `eof` so that `alt` only commits to them on an exact
/// full-token match — without that, `alt` would accept `tag("%0")` as a
/// match against `"%0(%env)"` (leaving `"(%env)"` unconsumed) and never
/// fall through to try the numeric-with-suffix branch, since `alt` doesn't
/// backtrack once a branch succeeds. That would wrongly reject `%0(%env)`
/// and `%01` even though both are legal numeric register spellings.
fn register_token(input: &str) -> TokResult<'_, RegisterToken> {
    alt((
        map(
            pair(tag(crate::consts::ZERO_REGISTER_TOKEN), eof),
            |_| RegisterToken::Zero,
        ),
        map(
            pair(tag(crate::consts::RESULT_REGISTER_TOKEN), eof),
            |_| RegisterToken::Result,
        ),
        map(
            pair(preceded(pair(char('%'), char('g')), digit1), eof),
            |(digits, _): (&str, &str)| RegisterToken::Global {
                index: digits.parse().unwrap_or(usize::MAX),
            },
        ),
        map(
            pair(preceded(pair(char('%'), char('t')), digit1), eof),
            |(digits, _): (&str, &str)| RegisterToken::Temp {
                index: digits.parse().unwrap_or(usize::MAX),
            },
        ),
        map(
            tuple((
                preceded(char('%'), preceded(opt(char('n')), digit1)),
                opt(env_word),
            )),
            |(digits, env): (&str, Option<EnvWord>)| RegisterToken::Numeric {
                index: digits.parse().unwrap_or(usize::MAX),
                env: env.unwrap_or(EnvWord::Env),
            },
        ),
    ))(input)
}

/// The only env-qualifier spellings [`env_word`] recognizes, used below to
/// tell a malformed environment qualifier apart from an otherwise malformed
/// register token.
const KNOWN_ENV_WORDS: [&str; 3] = ["(%env)", "(%penv)", "(%tenv)"];

fn parse_register(token: &str) -> Result<RegisterToken, ParseError> {
    if let Ok((_, reg)) = all_consuming(register_token)(token) {
        return Ok(reg);
    }
    // A register token carrying a parenthesized suffix that isn't one of
    // the known env words (e.g. `%5(%xenv)`) is specifically an
    // unrecognized environment qualifier, not a generically malformed
    // register — the error taxonomy (§7) distinguishes the two.
    if let Some(paren_idx) = token.find('(') {
        let suffix = &token[paren_idx..];
        if !KNOWN_ENV_WORDS.iter().any(|known| suffix.eq_ignore_ascii_case(known)) {
            return Err(ParseError::UnrecognizedEnvironment);
        }
    }
    Err(ParseError::UnrecognizedRegister)
}

fn hex_immediate(input: &str) -> TokResult<'_, u64> {
    map_res(
        preceded(tag_no_case("0x"), recognize(hex_digit1)),
        |digits: &str| u64::from_str_radix(digits, 16),
    )(input)
}

fn decimal_immediate(input: &str) -> TokResult<'_, u64> {
    map_res(digit1, |digits: &str| digits.parse::<u64>())(input)
}

/// Parses a `<imm>` operand: decimal by default, `0x`-prefixed hex otherwise.
/// Overflow of `u64` surfaces as [`ParseError::NumberTooLarge`] rather than
/// [`ParseError::UnrecognizedNumber`], since the token was otherwise
/// well-formed.
fn parse_immediate(token: &str) -> Result<u64, ParseError> {
    if let Ok((_, val)) = all_consuming(hex_immediate)(token) {
        return Ok(val);
    }
    if token.len() >= 2 && token[..2].eq_ignore_ascii_case("0x") {
        return Err(ParseError::NumberTooLarge);
    }
    if !token.is_empty() && token.chars().all(|c| c.is_ascii_digit()) {
        return all_consuming(decimal_immediate)(token)
            .map(|(_, val)| val)
            .map_err(|_| ParseError::NumberTooLarge);
    }
    Err(ParseError::UnrecognizedNumber)
}

/// Parses a `<imm>` or `#<n>` operand for `load`.
fn parse_imm_source(token: &str) -> Result<ImmSource, ParseError> {
    if let Some(rest) = token.strip_prefix('#') {
        return rest
            .parse::<usize>()
            .map(ImmSource::DataIndex)
            .map_err(|_| ParseError::UnrecognizedDataIndex);
    }
    parse_immediate(token).map(ImmSource::Literal)
}

/// Decodes a `0x`-prefixed hex byte string (as used by `.datas`' `data`
/// directive) into raw bytes. An odd digit count, or any non-hex digit, is
/// rejected as [`ParseError::UnrecognizedNumber`].
fn parse_hex_bytes(token: &str) -> Result<Vec<u8>, ParseError> {
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .ok_or(ParseError::UnrecognizedNumber)?;
    if digits.is_empty() || digits.len() % 2 != 0 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ParseError::UnrecognizedNumber);
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16).map_err(|_| ParseError::UnrecognizedNumber)
        })
        .collect()
}

/// Which top-level section the parser is currently inside, plus whatever
/// partial declaration it's accumulating for that section.
enum Section {
    None,
    Program,
    Type(TypeDecl),
    Datas,
    Func(IsFunction, usize),
    Imports,
    Exports,
    Module,
}

/// Parses a complete source file into an [`IsProgram`], accumulating every
/// [`ParseError`] encountered rather than stopping at the first one, so a
/// single run surfaces every syntax problem at once.
pub fn parse(source: &str) -> Result<IsProgram, WithSource<ParseError>> {
    let mut program = IsProgram::default();
    let mut section = Section::None;
    let mut errors = Vec::new();

    for (zero_based_line, raw_line) in source.lines().enumerate() {
        let line = zero_based_line + 1;
        let stripped = strip_comment(raw_line);
        if stripped.trim().is_empty() {
            continue;
        }

        if stripped.starts_with('.') {
            finish_section(&mut program, &mut section);
            let tokens = tokenize(&stripped[1..]);
            section = parse_header(&tokens, line, &mut errors);
            continue;
        }

        let tokens = tokenize(stripped.trim_start());
        if tokens.is_empty() {
            continue;
        }
        parse_body_line(&mut section, &mut program, &tokens, line, &mut errors);
    }
    finish_section(&mut program, &mut section);

    if errors.is_empty() {
        Ok(program)
    } else {
        Err(WithSource::new(errors))
    }
}

fn push_err(errors: &mut Vec<SourceErrorWrapper<ParseError>>, err: ParseError, line: usize, token: &str) {
    errors.push(SourceErrorWrapper::new(err, line, token));
}

fn parse_header(
    tokens: &[&str],
    line: usize,
    errors: &mut Vec<SourceErrorWrapper<ParseError>>,
) -> Section {
    let name = match tokens.first() {
        Some(name) => *name,
        None => return Section::None,
    };
    match name {
        "program" => Section::Program,
        "imports" => Section::Imports,
        "exports" => Section::Exports,
        "module" => Section::Module,
        "datas" => Section::Datas,
        "type" => match tokens.get(1).and_then(|t| unescape_identifier(t).ok()) {
            Some(name) => Section::Type(TypeDecl { name, size: 0, line }),
            None => {
                push_err(errors, ParseError::UnrecognizedCommand, line, name);
                Section::None
            }
        },
        "func" => match tokens.get(1).and_then(|t| unescape_identifier(t).ok()) {
            Some(name) => Section::Func(
                IsFunction {
                    name,
                    dyvarb_count: 0,
                    stvarb_decls: Vec::new(),
                    instructions: Vec::new(),
                },
                line,
            ),
            None => {
                push_err(errors, ParseError::UnrecognizedCommand, line, name);
                Section::None
            }
        },
        other => {
            push_err(errors, ParseError::UnrecognizedCommand, line, other);
            Section::None
        }
    }
}

/// Commits whatever section was being accumulated into `program`, then
/// resets `section` to `None`. Called both when a new header is seen and at
/// end of file.
fn finish_section(program: &mut IsProgram, section: &mut Section) {
    match std::mem::replace(section, Section::None) {
        Section::None
        | Section::Program
        | Section::Datas
        | Section::Imports
        | Section::Exports
        | Section::Module => {}
        Section::Type(decl) => program.types.push(decl),
        Section::Func(decl, line) => program.functions.push(Node(decl, line)),
    }
}

fn parse_body_line(
    section: &mut Section,
    program: &mut IsProgram,
    tokens: &[&str],
    line: usize,
    errors: &mut Vec<SourceErrorWrapper<ParseError>>,
) {
    let keyword = tokens[0];
    match section {
        Section::Program => {
            if keyword == "entry" {
                match tokens.get(1).and_then(|t| unescape_identifier(t).ok()) {
                    Some(name) => program.entry = Some(Node(name, line)),
                    None => push_err(errors, ParseError::UnrecognizedCommand, line, keyword),
                }
            } else {
                push_err(errors, ParseError::UnrecognizedCommand, line, keyword);
            }
        }
        Section::Type(decl) => {
            if keyword == "size" {
                match tokens.get(1).and_then(|t| parse_immediate(t).ok()) {
                    Some(size) => decl.size = size as usize,
                    None => push_err(
                        errors,
                        ParseError::UnrecognizedNumber,
                        line,
                        tokens.get(1).copied().unwrap_or(""),
                    ),
                }
            } else {
                push_err(errors, ParseError::UnrecognizedCommand, line, keyword);
            }
        }
        Section::Datas => {
            if keyword == "data" {
                parse_data_decl(program, tokens, line, errors);
            } else {
                push_err(errors, ParseError::UnrecognizedCommand, line, keyword);
            }
        }
        Section::Func(decl, _) => parse_func_line(decl, tokens, line, errors),
        Section::Imports | Section::Exports | Section::Module | Section::None => {
            // reserved sections: parsed and discarded
        }
    }
}

fn parse_data_decl(
    program: &mut IsProgram,
    tokens: &[&str],
    line: usize,
    errors: &mut Vec<SourceErrorWrapper<ParseError>>,
) {
    let index_tok = match tokens.get(1) {
        Some(t) => *t,
        None => return push_err(errors, ParseError::UnrecognizedDataIndex, line, "data"),
    };
    let index = match index_tok
        .strip_prefix('#')
        .and_then(|s| s.parse::<usize>().ok())
    {
        Some(idx) => idx,
        None => return push_err(errors, ParseError::UnrecognizedDataIndex, line, index_tok),
    };
    let hex_tok = match tokens.get(2) {
        Some(t) => *t,
        None => return push_err(errors, ParseError::UnrecognizedNumber, line, "data"),
    };
    let mut bytes = match parse_hex_bytes(hex_tok) {
        Ok(b) => b,
        Err(e) => return push_err(errors, e, line, hex_tok),
    };
    let capacity = match tokens.get(3).and_then(|t| t.parse::<usize>().ok()) {
        Some(c) => c,
        None => {
            return push_err(
                errors,
                ParseError::UnrecognizedNumber,
                line,
                tokens.get(3).copied().unwrap_or(""),
            )
        }
    };
    if bytes.len() > capacity {
        return push_err(errors, ParseError::NumberTooLarge, line, hex_tok);
    }
    bytes.resize(capacity, 0);
    // Duplicate indices are a symbol-resolution concern, not a syntax one;
    // `core::compile` rejects them with `CompileError::DuplicateDataIndex`.
    program.datas.push(DataDecl { index, bytes, line });
}

fn parse_func_line(
    decl: &mut IsFunction,
    tokens: &[&str],
    line: usize,
    errors: &mut Vec<SourceErrorWrapper<ParseError>>,
) {
    match tokens[0] {
        "arg" | "data" => {
            // reserved, no semantics in this core
        }
        "dyvarb" => match tokens.get(1).and_then(|t| parse_immediate(t).ok()) {
            Some(count) => decl.dyvarb_count = count as usize,
            None => push_err(
                errors,
                ParseError::UnrecognizedNumber,
                line,
                tokens.get(1).copied().unwrap_or(""),
            ),
        },
        "stvarb" => {
            let count = match tokens.get(1).and_then(|t| parse_immediate(t).ok()) {
                Some(c) => c as usize,
                None => {
                    return push_err(
                        errors,
                        ParseError::UnrecognizedNumber,
                        line,
                        tokens.get(1).copied().unwrap_or(""),
                    )
                }
            };
            let ty = match tokens.get(2).and_then(|t| unescape_identifier(t).ok()) {
                Some(ty) => ty,
                None => {
                    return push_err(
                        errors,
                        ParseError::UnrecognizedCommand,
                        line,
                        tokens.get(2).copied().unwrap_or(""),
                    )
                }
            };
            decl.stvarb_decls.push(StvarbDecl { count, ty, line });
        }
        "mov" => {
            let dst = match tokens.get(1).map(|t| parse_register(t)) {
                Some(Ok(r)) => r,
                _ => {
                    return push_err(
                        errors,
                        ParseError::UnrecognizedRegister,
                        line,
                        tokens.get(1).copied().unwrap_or(""),
                    )
                }
            };
            let src = match tokens.get(2).map(|t| parse_register(t)) {
                Some(Ok(r)) => r,
                _ => {
                    return push_err(
                        errors,
                        ParseError::UnrecognizedRegister,
                        line,
                        tokens.get(2).copied().unwrap_or(""),
                    )
                }
            };
            decl.instructions.push(Node(IsInstruction::Mov { dst, src }, line));
        }
        "load" => {
            let dst = match tokens.get(1).map(|t| parse_register(t)) {
                Some(Ok(r)) => r,
                _ => {
                    return push_err(
                        errors,
                        ParseError::UnrecognizedRegister,
                        line,
                        tokens.get(1).copied().unwrap_or(""),
                    )
                }
            };
            let src = match tokens.get(2).map(|t| parse_imm_source(t)) {
                Some(Ok(s)) => s,
                Some(Err(e)) => return push_err(errors, e, line, tokens.get(2).copied().unwrap_or("")),
                None => return push_err(errors, ParseError::UnrecognizedNumber, line, "load"),
            };
            let ty = match tokens.get(3).and_then(|t| unescape_identifier(t).ok()) {
                Some(ty) => ty,
                None => {
                    return push_err(
                        errors,
                        ParseError::UnrecognizedCommand,
                        line,
                        tokens.get(3).copied().unwrap_or(""),
                    )
                }
            };
            decl.instructions.push(Node(IsInstruction::Load { dst, src, ty }, line));
        }
        "ret" => decl.instructions.push(Node(IsInstruction::Ret, line)),
        "db_opreg" => decl.instructions.push(Node(IsInstruction::DbOpReg, line)),
        other => push_err(errors, ParseError::UnrecognizedInstruction, line, other),
    }
}
