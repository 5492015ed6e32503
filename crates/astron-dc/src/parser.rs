//! Line-oriented parser for DC files.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, trace, warn};

use crate::error::ParseError;
use crate::schema::{
    ArrayLength, AtomicField, Class, DataType, Declaration, Field, FieldId, Import, KeywordSet,
    MethodField, MolecularField, Parameter, Schema, Struct, Typedef,
};
use crate::syntax::{self, Keyword, OPERATORS, Primitive};

/// Parse DC source text.
pub fn parse_str(source: &str) -> Result<Schema, ParseError> {
    Parser::new().parse(source)
}

/// Read and parse a DC file.
pub fn parse_file(path: impl AsRef<Path>) -> Result<Schema, ParseError> {
    let path = path.as_ref();
    let source = std::fs::read_to_string(path).map_err(|source| ParseError::FileNotFound {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), bytes = source.len(), "parsing DC file");
    parse_str(&source)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Indent {
    Tabs,
    Spaces(usize),
}

impl Indent {
    fn detect(prefix: &str, line: usize) -> Result<Self, ParseError> {
        if prefix.chars().all(|c| c == '\t') {
            Ok(Indent::Tabs)
        } else if prefix.chars().all(|c| c == ' ') {
            Ok(Indent::Spaces(prefix.len()))
        } else {
            Err(ParseError::InvalidIndentation { line })
        }
    }

    fn accepts(self, prefix: &str) -> bool {
        match self {
            Indent::Tabs => prefix.chars().all(|c| c == '\t'),
            Indent::Spaces(unit) => {
                prefix.chars().all(|c| c == ' ') && prefix.len() % unit == 0
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Struct,
    Class,
}

#[derive(Debug)]
struct Block {
    kind: BlockKind,
    name: String,
    parents: Vec<String>,
    fields: Vec<Field>,
    inherited: usize,
    opened_at: usize,
}

/// Names already bound at top level.
#[derive(Debug)]
enum Named {
    Typedef(DataType),
    Struct(usize),
    Class(usize),
}

/// Single-use DC parser. Build one per file and call [`Parser::parse`].
#[derive(Debug, Default)]
pub struct Parser {
    schema: Schema,
    names: HashMap<String, Named>,
    next_field_id: u32,
    next_class_id: u32,
    indent: Option<Indent>,
    block: Option<Block>,
}

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(mut self, source: &str) -> Result<Schema, ParseError> {
        for (index, raw) in source.lines().enumerate() {
            let line = index + 1;
            let text = strip_comment(raw).trim_end();
            if text.trim().is_empty() {
                continue;
            }
            trace!(line, text = text.trim(), "dc line");

            if self.block.is_some() {
                self.block_line(text, line)?;
            } else {
                self.top_level(text.trim(), line)?;
            }
        }

        if let Some(block) = self.block.take() {
            return Err(ParseError::MissingDelimiter {
                line: block.opened_at,
                expected: "};",
            });
        }

        debug!(
            declarations = self.schema.declarations.len(),
            classes = self.next_class_id,
            fields = self.next_field_id,
            "DC schema parsed"
        );
        Ok(self.schema)
    }

    fn top_level(&mut self, text: &str, line: usize) -> Result<(), ParseError> {
        let keyword = text.split_whitespace().next().unwrap_or_default();
        let rest = text[keyword.len()..].trim();
        match keyword {
            "dclass" => self.open_block(BlockKind::Class, rest, line),
            "struct" => self.open_block(BlockKind::Struct, rest, line),
            "typedef" => self.typedef(rest, line),
            "keyword" => self.keyword(rest, line),
            "from" => self.import(rest, line),
            other => Err(ParseError::InvalidToken {
                line,
                token: other.to_string(),
            }),
        }
    }

    fn block_line(&mut self, text: &str, line: usize) -> Result<(), ParseError> {
        let trimmed = text.trim_start();
        let prefix = &text[..text.len() - trimmed.len()];

        if trimmed.starts_with('}') {
            if !prefix.is_empty() {
                return Err(ParseError::InvalidIndentation { line });
            }
            if trimmed != "};" {
                return Err(ParseError::MissingDelimiter {
                    line,
                    expected: "};",
                });
            }
            return self.close_block(line);
        }

        if prefix.is_empty() {
            return Err(ParseError::InvalidIndentation { line });
        }
        let indent = match self.indent {
            Some(indent) => indent,
            None => {
                let indent = Indent::detect(prefix, line)?;
                trace!(line, ?indent, "indentation detected");
                self.indent = Some(indent);
                indent
            }
        };
        if !indent.accepts(prefix) {
            return Err(ParseError::InvalidIndentation { line });
        }

        self.field(trimmed, line)
    }

    fn open_block(&mut self, kind: BlockKind, rest: &str, line: usize) -> Result<(), ParseError> {
        let Some(brace) = rest.find('{') else {
            return Err(ParseError::MissingDelimiter {
                line,
                expected: "{",
            });
        };
        let header = rest[..brace].trim();
        let inline = rest[brace + 1..].trim();

        let (name, parents) = match header.split_once(':') {
            Some((name, parents)) => (name.trim(), Some(parents)),
            None => (header, None),
        };
        self.check_new_name(name, line)?;

        let mut block = Block {
            kind,
            name: name.to_string(),
            parents: Vec::new(),
            fields: Vec::new(),
            inherited: 0,
            opened_at: line,
        };

        if let Some(parents) = parents {
            if kind == BlockKind::Struct {
                return Err(ParseError::InvalidToken {
                    line,
                    token: ":".to_string(),
                });
            }
            for parent in parents.split(',').map(str::trim) {
                if parent.is_empty() {
                    return Err(ParseError::InvalidToken {
                        line,
                        token: ",".to_string(),
                    });
                }
                self.inherit(&mut block, parent, line)?;
            }
        }

        self.block = Some(block);
        if !inline.is_empty() {
            self.inline_body(inline, line)?;
        }
        Ok(())
    }

    fn inherit(&self, block: &mut Block, parent: &str, line: usize) -> Result<(), ParseError> {
        let Some(parent_fields) = self.declared_fields(parent) else {
            warn!(line, class = %block.name, parent, "parent is not declared yet; inheritance skipped");
            return Ok(());
        };

        for field in parent_fields {
            if let Some(existing) = block.fields.iter().find(|f| f.name() == field.name()) {
                // Diamond inheritance delivers the same field twice.
                if existing.id() == field.id() {
                    continue;
                }
                return Err(ParseError::InvalidField {
                    line,
                    reason: format!(
                        "`{}` from `{parent}` collides with an inherited field of the same name",
                        field.name()
                    ),
                });
            }
            block.fields.push(field.clone());
        }
        block.parents.push(parent.to_string());
        block.inherited = block.fields.len();
        Ok(())
    }

    /// One-line bodies such as `struct Pos { int16 x; int16 y; };`.
    fn inline_body(&mut self, text: &str, line: usize) -> Result<(), ParseError> {
        let mut rest = text.trim_start();
        while !rest.is_empty() {
            if rest.starts_with('}') {
                if rest != "};" {
                    return Err(ParseError::MissingDelimiter {
                        line,
                        expected: "};",
                    });
                }
                return self.close_block(line);
            }
            let Some(end) = statement_end(rest) else {
                return Err(ParseError::MissingDelimiter {
                    line,
                    expected: ";",
                });
            };
            self.field(&rest[..=end], line)?;
            rest = rest[end + 1..].trim_start();
        }
        Ok(())
    }

    fn close_block(&mut self, line: usize) -> Result<(), ParseError> {
        let Some(block) = self.block.take() else {
            return Err(ParseError::InvalidToken {
                line,
                token: "};".to_string(),
            });
        };
        let index = self.schema.declarations.len();

        match block.kind {
            BlockKind::Struct => {
                debug!(name = %block.name, fields = block.fields.len(), "struct parsed");
                self.names.insert(block.name.clone(), Named::Struct(index));
                self.schema.declarations.push(Declaration::Struct(Struct {
                    name: block.name,
                    fields: block.fields,
                }));
            }
            BlockKind::Class => {
                let id = u16::try_from(self.next_class_id).map_err(|_| ParseError::InvalidField {
                    line,
                    reason: "too many classes".to_string(),
                })?;
                self.next_class_id += 1;
                debug!(
                    name = %block.name,
                    id,
                    fields = block.fields.len(),
                    inherited = block.inherited,
                    "dclass parsed"
                );
                self.names.insert(block.name.clone(), Named::Class(index));
                self.schema.declarations.push(Declaration::Class(Class {
                    id,
                    name: block.name,
                    parents: block.parents,
                    fields: block.fields,
                    inherited: block.inherited,
                }));
            }
        }
        Ok(())
    }

    fn field(&mut self, text: &str, line: usize) -> Result<(), ParseError> {
        let Some(statement) = text.strip_suffix(';') else {
            return Err(ParseError::MissingDelimiter {
                line,
                expected: ";",
            });
        };
        let statement = statement.trim();
        let Some(mut block) = self.block.take() else {
            return Err(ParseError::InvalidToken {
                line,
                token: statement.to_string(),
            });
        };

        let field = self.parse_field(&block, statement, line)?;
        if block.kind == BlockKind::Struct && !matches!(field, Field::Atomic(_)) {
            return Err(ParseError::InvalidField {
                line,
                reason: format!("struct `{}` may only hold plain fields", block.name),
            });
        }
        if block.fields.iter().any(|f| f.name() == field.name()) {
            return Err(ParseError::InvalidField {
                line,
                reason: format!("`{}` is declared twice in `{}`", field.name(), block.name),
            });
        }

        trace!(line, block = %block.name, field = field.name(), id = field.id(), "field parsed");
        block.fields.push(field);
        self.block = Some(block);
        Ok(())
    }

    fn parse_field(&mut self, block: &Block, statement: &str, line: usize) -> Result<Field, ParseError> {
        let stop = statement.find(['(', '=', '"']).unwrap_or(statement.len());

        if let Some(colon) = statement.find(':')
            && colon < stop
        {
            return self.parse_molecular(block, statement, colon, line);
        }
        if let Some(paren) = statement.find('(') {
            let head = statement[..paren].trim();
            if !head.contains(char::is_whitespace) && self.resolve_base(head).is_none() {
                return self.parse_method(statement, paren, line);
            }
        }
        self.parse_atomic(statement, line)
    }

    fn parse_atomic(&mut self, statement: &str, line: usize) -> Result<Field, ParseError> {
        let (declaration, tail) = match split_outside_parens(statement, '=') {
            Some((declaration, tail)) => (declaration, Some(tail.trim())),
            None => (statement, None),
        };
        let declaration = normalize_modifiers(declaration);
        let mut tokens = declaration.split_whitespace();
        let (Some(type_token), Some(name_token)) = (tokens.next(), tokens.next()) else {
            return Err(ParseError::InvalidField {
                line,
                reason: format!("expected `<type> <name>` in `{statement}`"),
            });
        };

        let (name, suffix) = split_array_suffix(name_token);
        let data_type = self.parse_type(&format!("{type_token}{suffix}"), line)?;
        check_identifier(name, line)?;

        let (default, keywords) = match tail {
            Some(tail) => {
                let (value, rest) = split_default(tail).ok_or_else(|| ParseError::InvalidField {
                    line,
                    reason: format!("`{name}` has `=` without a value"),
                })?;
                if tokens.next().is_some() {
                    return Err(ParseError::InvalidField {
                        line,
                        reason: format!("keywords of `{name}` must follow its default"),
                    });
                }
                (Some(value.to_string()), self.parse_keywords(rest.split_whitespace(), line)?)
            }
            None => (None, self.parse_keywords(tokens, line)?),
        };

        Ok(Field::Atomic(AtomicField {
            id: self.allocate_field_id(line)?,
            name: name.to_string(),
            data_type,
            default,
            keywords,
        }))
    }

    fn parse_method(&mut self, statement: &str, open: usize, line: usize) -> Result<Field, ParseError> {
        let name = statement[..open].trim();
        check_identifier(name, line)?;
        let close = matching_paren(statement, open).ok_or(ParseError::MissingDelimiter {
            line,
            expected: ")",
        })?;

        let inner = statement[open + 1..close].trim();
        let mut parameters = Vec::new();
        if !inner.is_empty() {
            for piece in split_top_level(inner, ',') {
                parameters.push(self.parse_parameter(piece, line)?);
            }
        }
        let keywords = self.parse_keywords(statement[close + 1..].split_whitespace(), line)?;

        Ok(Field::Method(MethodField {
            id: self.allocate_field_id(line)?,
            name: name.to_string(),
            parameters,
            keywords,
        }))
    }

    fn parse_parameter(&self, text: &str, line: usize) -> Result<Parameter, ParseError> {
        let text = match split_outside_parens(text, '=') {
            Some((declaration, _default)) => declaration,
            None => text,
        };
        let normalized = normalize_modifiers(text.trim());
        let tokens: Vec<&str> = normalized.split_whitespace().collect();
        match tokens.as_slice() {
            [type_token] => Ok(Parameter {
                data_type: self.parse_type(type_token, line)?,
                name: None,
            }),
            [type_token, name_token] => {
                let (name, suffix) = split_array_suffix(name_token);
                check_identifier(name, line)?;
                Ok(Parameter {
                    data_type: self.parse_type(&format!("{type_token}{suffix}"), line)?,
                    name: Some(name.to_string()),
                })
            }
            _ => Err(ParseError::InvalidField {
                line,
                reason: format!("malformed parameter `{}`", text.trim()),
            }),
        }
    }

    fn parse_molecular(
        &mut self,
        block: &Block,
        statement: &str,
        colon: usize,
        line: usize,
    ) -> Result<Field, ParseError> {
        let name = statement[..colon].trim();
        check_identifier(name, line)?;

        let mut components = Vec::new();
        let mut component_ids = Vec::new();
        let mut keywords = KeywordSet::new();
        let mut parameters = Vec::new();

        for component in statement[colon + 1..].split(',').map(str::trim) {
            if component.is_empty() {
                return Err(ParseError::InvalidField {
                    line,
                    reason: format!("empty component in `{name}`"),
                });
            }
            let Some(field) = block.fields.iter().find(|f| f.name() == component) else {
                return Err(ParseError::UndeclaredComponent {
                    line,
                    field: name.to_string(),
                    component: component.to_string(),
                });
            };
            if field.is_molecular() {
                return Err(ParseError::InvalidField {
                    line,
                    reason: format!("`{name}` cannot contain molecular field `{component}`"),
                });
            }
            components.push(component.to_string());
            component_ids.push(field.id());
            keywords.extend(field.keywords().iter().cloned());
            parameters.extend(field.parameters());
        }

        Ok(Field::Molecular(MolecularField {
            id: self.allocate_field_id(line)?,
            name: name.to_string(),
            components,
            component_ids,
            keywords,
            parameters,
        }))
    }

    fn parse_keywords<'a>(
        &self,
        tokens: impl Iterator<Item = &'a str>,
        line: usize,
    ) -> Result<KeywordSet, ParseError> {
        tokens
            .map(|token| {
                Keyword::builtin(token)
                    .or_else(|| {
                        self.schema
                            .keywords
                            .iter()
                            .any(|k| k == token)
                            .then(|| Keyword::Custom(token.to_string()))
                    })
                    .ok_or_else(|| ParseError::InvalidToken {
                        line,
                        token: token.to_string(),
                    })
            })
            .collect()
    }

    fn parse_type(&self, token: &str, line: usize) -> Result<DataType, ParseError> {
        if let Some(stripped) = token.strip_suffix(']') {
            let open = stripped.rfind('[').ok_or_else(|| ParseError::InvalidToken {
                line,
                token: token.to_string(),
            })?;
            let element = self.parse_type(&stripped[..open], line)?;
            let length = parse_array_length(&stripped[open + 1..]).ok_or_else(|| {
                ParseError::InvalidToken {
                    line,
                    token: token.to_string(),
                }
            })?;
            return Ok(DataType::array(element, length));
        }

        let base = strip_modifiers(token).ok_or_else(|| ParseError::InvalidToken {
            line,
            token: token.to_string(),
        })?;
        self.resolve_base(base).ok_or_else(|| ParseError::InvalidToken {
            line,
            token: base.to_string(),
        })
    }

    fn resolve_base(&self, name: &str) -> Option<DataType> {
        if let Some(primitive) = Primitive::from_token(name) {
            return Some(DataType::Primitive(primitive));
        }
        match self.names.get(name)? {
            Named::Typedef(data_type) => Some(data_type.clone()),
            Named::Struct(_) => Some(DataType::Struct(name.to_string())),
            Named::Class(_) => None,
        }
    }

    fn declared_fields(&self, name: &str) -> Option<&[Field]> {
        let index = match self.names.get(name)? {
            Named::Struct(index) | Named::Class(index) => *index,
            Named::Typedef(_) => return None,
        };
        match self.schema.declarations.get(index)? {
            Declaration::Struct(s) => Some(&s.fields),
            Declaration::Class(c) => Some(&c.fields),
            _ => None,
        }
    }

    fn typedef(&mut self, rest: &str, line: usize) -> Result<(), ParseError> {
        let Some(body) = rest.strip_suffix(';') else {
            return Err(ParseError::MissingDelimiter {
                line,
                expected: ";",
            });
        };
        let normalized = normalize_modifiers(body.trim());
        let tokens: Vec<&str> = normalized.split_whitespace().collect();
        let [type_token, alias_token] = tokens.as_slice() else {
            return Err(ParseError::InvalidField {
                line,
                reason: format!("expected `typedef <type> <alias>;`, found `{}`", body.trim()),
            });
        };

        let (alias, suffix) = split_array_suffix(alias_token);
        let data_type = self.parse_type(&format!("{type_token}{suffix}"), line)?;
        self.check_new_name(alias, line)?;

        trace!(line, alias, %data_type, "typedef");
        self.names
            .insert(alias.to_string(), Named::Typedef(data_type.clone()));
        self.schema.declarations.push(Declaration::Typedef(Typedef {
            alias: alias.to_string(),
            data_type,
        }));
        Ok(())
    }

    fn keyword(&mut self, rest: &str, line: usize) -> Result<(), ParseError> {
        let Some(name) = rest.strip_suffix(';').map(str::trim) else {
            return Err(ParseError::MissingDelimiter {
                line,
                expected: ";",
            });
        };
        if Keyword::builtin(name).is_some() {
            return Ok(());
        }
        check_identifier(name, line)?;
        if !self.schema.keywords.iter().any(|k| k == name) {
            self.schema.keywords.push(name.to_string());
        }
        Ok(())
    }

    fn import(&mut self, rest: &str, line: usize) -> Result<(), ParseError> {
        let rest = rest.strip_suffix(';').unwrap_or(rest);
        let module = rest.split_whitespace().next().unwrap_or_default();
        let after = rest[module.len()..].trim_start();
        let items = after
            .strip_prefix("import")
            .filter(|items| items.starts_with(char::is_whitespace))
            .ok_or_else(|| ParseError::InvalidToken {
                line,
                token: after.split_whitespace().next().unwrap_or(rest).to_string(),
            })?;

        if module.is_empty() || !module.split('.').all(is_word) {
            return Err(ParseError::InvalidIdentifier {
                line,
                name: module.to_string(),
            });
        }

        for item in items.split(',').map(str::trim) {
            let mut parts = item.split('/').map(str::trim);
            let class_name = parts.next().unwrap_or_default();
            check_identifier(class_name, line)?;

            let mut views = vec![class_name.to_string()];
            for suffix in parts {
                if !is_word(suffix) {
                    return Err(ParseError::InvalidToken {
                        line,
                        token: suffix.to_string(),
                    });
                }
                views.push(format!("{class_name}{suffix}"));
            }

            trace!(line, module, class = class_name, ?views, "import");
            self.schema.declarations.push(Declaration::Import(Import {
                module: module.to_string(),
                class_name: class_name.to_string(),
                views,
            }));
        }
        Ok(())
    }

    fn check_new_name(&self, name: &str, line: usize) -> Result<(), ParseError> {
        check_identifier(name, line)?;
        if self.names.contains_key(name) {
            return Err(ParseError::InvalidIdentifier {
                line,
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn allocate_field_id(&mut self, line: usize) -> Result<FieldId, ParseError> {
        let id = FieldId::try_from(self.next_field_id).map_err(|_| ParseError::InvalidField {
            line,
            reason: "too many fields".to_string(),
        })?;
        self.next_field_id += 1;
        Ok(id)
    }
}

fn check_identifier(name: &str, line: usize) -> Result<(), ParseError> {
    if syntax::is_identifier(name) {
        Ok(())
    } else {
        Err(ParseError::InvalidIdentifier {
            line,
            name: name.to_string(),
        })
    }
}

fn is_word(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Drop a trailing `//` comment that is not inside a string literal.
fn strip_comment(line: &str) -> &str {
    let mut in_string = false;
    let bytes = line.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'"' => in_string = !in_string,
            b'/' if !in_string && bytes.get(i + 1) == Some(&b'/') => return &line[..i],
            _ => {}
        }
    }
    line
}

/// Glue inline modifiers to their type: `int16 / 10` becomes `int16/10`.
fn normalize_modifiers(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut depth = 0usize;
    let mut skip_space = false;

    for c in text.chars() {
        match c {
            '(' => {
                out.truncate(out.trim_end().len());
                out.push(c);
                depth += 1;
            }
            ')' => {
                out.push(c);
                depth = depth.saturating_sub(1);
                skip_space = false;
            }
            c if c.is_whitespace() => {
                if depth == 0 && !skip_space {
                    out.push(' ');
                }
            }
            c if OPERATORS.contains(&c) && depth == 0 => {
                out.truncate(out.trim_end().len());
                out.push(c);
                skip_space = true;
            }
            c => {
                out.push(c);
                skip_space = false;
            }
        }
    }
    out
}

/// Remove arithmetic and range modifiers, returning the bare type name.
fn strip_modifiers(token: &str) -> Option<&str> {
    let Some(start) = token.find(|c: char| c == '(' || OPERATORS.contains(&c)) else {
        return Some(token);
    };
    let (base, modifier) = token.split_at(start);
    let valid = !base.is_empty()
        && modifier.chars().any(|c| c.is_ascii_digit())
        && modifier.chars().all(|c| {
            c.is_ascii_digit() || c == '.' || c == '(' || c == ')' || c == ',' || OPERATORS.contains(&c)
        });
    valid.then_some(base)
}

fn parse_array_length(inner: &str) -> Option<ArrayLength> {
    let inner = inner.trim();
    if inner.is_empty() {
        return Some(ArrayLength::Variable);
    }
    if let Some((low, high)) = inner.split_once('-') {
        let low: u32 = low.trim().parse().ok()?;
        let high: u32 = high.trim().parse().ok()?;
        return (low <= high).then_some(ArrayLength::Variable);
    }
    inner.parse().ok().map(ArrayLength::Fixed)
}

fn split_array_suffix(name: &str) -> (&str, &str) {
    match name.find('[') {
        Some(open) => name.split_at(open),
        None => (name, ""),
    }
}

/// Split a default literal from the keywords after it.
fn split_default(tail: &str) -> Option<(&str, &str)> {
    if tail.starts_with('"') {
        let close = tail[1..].find('"')? + 1;
        return Some((&tail[..=close], &tail[close + 1..]));
    }
    let value = tail.split_whitespace().next()?;
    Some((value, &tail[value.len()..]))
}

fn split_outside_parens(text: &str, separator: char) -> Option<(&str, &str)> {
    let mut depth = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            c if c == separator && depth == 0 => return Some((&text[..i], &text[i + 1..])),
            _ => {}
        }
    }
    None
}

fn split_top_level(text: &str, separator: char) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut rest = text;
    while let Some((piece, tail)) = split_outside_parens(rest, separator) {
        pieces.push(piece);
        rest = tail;
    }
    pieces.push(rest);
    pieces
}

fn matching_paren(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in text[open..].char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

fn statement_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ';' if depth == 0 => return Some(i),
            _ => {}
        }
    }
    None
}
