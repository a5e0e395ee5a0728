use confsmith_core::error::ModelError;
use confsmith_core::path::NodePath;
use confsmith_core::schema::{
    Range, SchemaNodeId, SchemaNodeKind, SchemaSpec, SchemaSpecBuilder, UnknownStatement, YangType,
};

use crate::error::{DslError, Span};
use crate::lexer::{tokenize, SpannedToken};
use crate::token::Token;

/// Parses one or more yang-lite modules into a finished [`SchemaSpec`].
pub fn parse(source: &str) -> Result<SchemaSpec, Vec<DslError>> {
    let mut builder = SchemaSpec::builder();
    parse_into(&mut builder, source)?;
    builder.finish().map_err(|e| {
        vec![DslError::CoreModelError {
            source: e,
            span: Span::new(0, 0),
        }]
    })
}

/// Parses modules into an existing builder, so several source files can
/// contribute to one spec before `finish`.
pub fn parse_into(builder: &mut SchemaSpecBuilder, source: &str) -> Result<(), Vec<DslError>> {
    let tokens = tokenize(source)?;
    tracing::trace!(tokens = tokens.len(), "tokenized yang-lite source");
    Parser::new(tokens).parse_file(builder)
}

/// Recursive descent parser for the yang-lite grammar.
///
/// Consumes a flat list of spanned tokens produced by the lexer and
/// populates a [`SchemaSpecBuilder`].
struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<SpannedToken>) -> Self {
        Self { tokens, pos: 0 }
    }

    // -- Cursor helpers --

    fn peek(&self) -> Option<&SpannedToken> {
        self.tokens.get(self.pos)
    }

    fn peek_token(&self) -> Option<&Token> {
        self.peek().map(|st| &st.token)
    }

    fn peek_token_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|st| &st.token)
    }

    fn advance(&mut self) -> Option<SpannedToken> {
        if self.pos < self.tokens.len() {
            let tok = self.tokens[self.pos].clone();
            self.pos += 1;
            Some(tok)
        } else {
            None
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<SpannedToken, DslError> {
        match self.advance() {
            Some(st) if st.token == *expected => Ok(st),
            Some(st) => Err(DslError::UnexpectedToken {
                expected: expected.description().to_string(),
                found: format!("{} ('{}')", st.token.description(), st.text),
                span: st.span,
            }),
            None => Err(DslError::UnexpectedEndOfInput {
                expected: expected.description().to_string(),
            }),
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<SpannedToken, DslError> {
        match self.advance() {
            Some(st) if st.token == Token::Ident => Ok(st),
            Some(st) => Err(DslError::UnexpectedToken {
                expected: what.to_string(),
                found: format!("{} ('{}')", st.token.description(), st.text),
                span: st.span,
            }),
            None => Err(DslError::UnexpectedEndOfInput {
                expected: what.to_string(),
            }),
        }
    }

    fn expect_string(&mut self) -> Result<SpannedToken, DslError> {
        match self.advance() {
            Some(st) if st.token == Token::StringLiteral => Ok(st),
            Some(st) => Err(DslError::UnexpectedToken {
                expected: "string literal".to_string(),
                found: format!("{} ('{}')", st.token.description(), st.text),
                span: st.span,
            }),
            None => Err(DslError::UnexpectedEndOfInput {
                expected: "string literal".to_string(),
            }),
        }
    }

    fn expect_integer(&mut self) -> Result<(i128, Span), DslError> {
        match self.advance() {
            Some(st) if st.token == Token::IntegerLiteral => {
                let value = st.text.parse::<i128>().map_err(|_| {
                    DslError::InvalidIntegerLiteral {
                        text: st.text.clone(),
                        span: st.span.clone(),
                    }
                })?;
                Ok((value, st.span))
            }
            Some(st) => Err(DslError::UnexpectedToken {
                expected: "integer literal".to_string(),
                found: format!("{} ('{}')", st.token.description(), st.text),
                span: st.span,
            }),
            None => Err(DslError::UnexpectedEndOfInput {
                expected: "integer literal".to_string(),
            }),
        }
    }

    fn current_span(&self) -> Span {
        self.peek().map(|st| st.span.clone()).unwrap_or_else(|| {
            self.tokens
                .last()
                .map(|st| Span::new(st.span.end, st.span.end))
                .unwrap_or(Span::new(0, 0))
        })
    }

    /// Consumes the offending token and builds the error for it.
    fn unexpected(&mut self, expected: &str) -> DslError {
        match self.advance() {
            Some(st) => DslError::UnexpectedToken {
                expected: expected.to_string(),
                found: format!("{} ('{}')", st.token.description(), st.text),
                span: st.span,
            },
            None => DslError::UnexpectedEndOfInput {
                expected: expected.to_string(),
            },
        }
    }

    // -- Grammar productions --

    /// file = module*
    fn parse_file(&mut self, builder: &mut SchemaSpecBuilder) -> Result<(), Vec<DslError>> {
        let mut errors = Vec::new();

        while self.peek().is_some() {
            if let Err(e) = self.parse_module(builder) {
                errors.push(e);
                self.recover_to_next_module();
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Skip tokens until the next top-level `module` keyword.
    fn recover_to_next_module(&mut self) {
        let mut brace_depth: i32 = 0;
        while let Some(st) = self.peek() {
            match st.token {
                Token::LBrace => {
                    brace_depth += 1;
                    self.advance();
                }
                Token::RBrace => {
                    brace_depth -= 1;
                    self.advance();
                    if brace_depth <= 0 {
                        return;
                    }
                }
                Token::Module if brace_depth == 0 => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    /// module = "module" IDENT "{" module_stmt* "}"
    fn parse_module(&mut self, builder: &mut SchemaSpecBuilder) -> Result<(), DslError> {
        self.expect(&Token::Module)?;
        let name_tok = self.expect_ident("module name")?;
        let module = builder
            .module(&name_tok.text, "", "")
            .map_err(|e| DslError::CoreModelError {
                source: e,
                span: name_tok.span.clone(),
            })?;
        self.expect(&Token::LBrace)?;

        let mut seen_revision = false;
        loop {
            match self.peek_token() {
                Some(Token::RBrace) => {
                    self.advance();
                    break;
                }
                Some(Token::Namespace) => {
                    let kw_span = self.current_span();
                    self.advance();
                    if !builder.namespace(module).is_empty() {
                        return Err(DslError::DuplicateStatement {
                            keyword: "namespace".to_string(),
                            span: kw_span,
                        });
                    }
                    let ns = self.expect_string()?;
                    builder.set_namespace(module, &unquote(&ns.text));
                    self.expect(&Token::Semi)?;
                }
                Some(Token::Prefix) => {
                    let kw_span = self.current_span();
                    self.advance();
                    if !builder.prefix(module).is_empty() {
                        return Err(DslError::DuplicateStatement {
                            keyword: "prefix".to_string(),
                            span: kw_span,
                        });
                    }
                    let prefix = self.expect_ident("prefix identifier")?;
                    builder.set_prefix(module, &prefix.text);
                    self.expect(&Token::Semi)?;
                }
                Some(Token::Revision) => {
                    let kw_span = self.current_span();
                    self.advance();
                    if seen_revision {
                        return Err(DslError::DuplicateStatement {
                            keyword: "revision".to_string(),
                            span: kw_span,
                        });
                    }
                    seen_revision = true;
                    let rev = self.expect_string()?;
                    builder.set_revision(module, &unquote(&rev.text));
                    self.expect(&Token::Semi)?;
                }
                Some(Token::Feature) => {
                    self.advance();
                    let feature = self.expect_ident("feature name")?;
                    builder.add_feature(module, &feature.text);
                    self.expect(&Token::Semi)?;
                }
                Some(
                    Token::Container | Token::List | Token::Leaf | Token::LeafList | Token::Choice,
                ) => {
                    self.parse_data_stmt(builder, module, None)?;
                }
                Some(Token::Ident) if self.peek_token_at(1) == Some(&Token::Colon) => {
                    let stmt = self.parse_unknown_statement()?;
                    builder.add_unknown(module, stmt);
                }
                Some(_) => return Err(self.unexpected("module statement")),
                None => {
                    return Err(DslError::UnexpectedEndOfInput {
                        expected: "'}'".to_string(),
                    });
                }
            }
        }

        if builder.namespace(module).is_empty() {
            return Err(DslError::MissingStatement {
                keyword: "namespace".to_string(),
                owner: format!("module '{}'", name_tok.text),
                span: name_tok.span.clone(),
            });
        }
        if builder.prefix(module).is_empty() {
            return Err(DslError::MissingStatement {
                keyword: "prefix".to_string(),
                owner: format!("module '{}'", name_tok.text),
                span: name_tok.span,
            });
        }
        Ok(())
    }

    /// unknown_stmt = IDENT ":" IDENT [STRING] ";"
    fn parse_unknown_statement(&mut self) -> Result<UnknownStatement, DslError> {
        let prefix = self.expect_ident("extension prefix")?;
        self.expect(&Token::Colon)?;
        let keyword = self.expect_ident("extension keyword")?;
        let argument = if self.peek_token() == Some(&Token::StringLiteral) {
            let arg = self.expect_string()?;
            Some(unquote(&arg.text))
        } else {
            None
        };
        self.expect(&Token::Semi)?;
        Ok(UnknownStatement {
            prefix: prefix.text,
            keyword: keyword.text,
            argument,
        })
    }

    /// data_stmt = container | list | leaf | leaf_list | choice
    fn parse_data_stmt(
        &mut self,
        builder: &mut SchemaSpecBuilder,
        module: usize,
        parent: Option<SchemaNodeId>,
    ) -> Result<(), DslError> {
        match self.peek_token() {
            Some(Token::Container) => self.parse_container(builder, module, parent),
            Some(Token::List) => self.parse_list(builder, module, parent),
            Some(Token::Leaf) => self.parse_leaf(builder, module, parent),
            Some(Token::LeafList) => self.parse_leaf_list(builder, module, parent),
            Some(Token::Choice) => self.parse_choice(builder, module, parent),
            _ => Err(self.unexpected("data statement")),
        }
    }

    /// container = "container" IDENT "{" (presence | data_stmt)* "}"
    fn parse_container(
        &mut self,
        builder: &mut SchemaSpecBuilder,
        module: usize,
        parent: Option<SchemaNodeId>,
    ) -> Result<(), DslError> {
        self.expect(&Token::Container)?;
        let name = self.expect_ident("container name")?;
        let node = builder.add_node(
            module,
            parent,
            &name.text,
            SchemaNodeKind::Container { presence: false },
        );
        self.expect(&Token::LBrace)?;
        loop {
            match self.peek_token() {
                Some(Token::RBrace) => {
                    self.advance();
                    return Ok(());
                }
                Some(Token::Presence) => {
                    self.advance();
                    // Optional description string, as in YANG proper.
                    if self.peek_token() == Some(&Token::StringLiteral) {
                        self.advance();
                    }
                    self.expect(&Token::Semi)?;
                    builder.set_presence(node);
                }
                Some(_) => {
                    self.parse_data_stmt(builder, module, Some(node))?;
                }
                None => {
                    return Err(DslError::UnexpectedEndOfInput {
                        expected: "'}'".to_string(),
                    });
                }
            }
        }
    }

    /// list = "list" IDENT "{" (key_stmt | data_stmt)* "}"
    fn parse_list(
        &mut self,
        builder: &mut SchemaSpecBuilder,
        module: usize,
        parent: Option<SchemaNodeId>,
    ) -> Result<(), DslError> {
        self.expect(&Token::List)?;
        let name = self.expect_ident("list name")?;
        let node = builder.add_node(
            module,
            parent,
            &name.text,
            SchemaNodeKind::List { keys: Vec::new() },
        );
        self.expect(&Token::LBrace)?;
        let mut seen_key = false;
        loop {
            match self.peek_token() {
                Some(Token::RBrace) => {
                    self.advance();
                    return Ok(());
                }
                Some(Token::Key) => {
                    let kw_span = self.current_span();
                    self.advance();
                    if seen_key {
                        return Err(DslError::DuplicateStatement {
                            keyword: "key".to_string(),
                            span: kw_span,
                        });
                    }
                    seen_key = true;
                    let mut keys = vec![self.expect_ident("key leaf name")?.text];
                    while self.peek_token() == Some(&Token::Ident) {
                        if let Some(st) = self.advance() {
                            keys.push(st.text);
                        }
                    }
                    self.expect(&Token::Semi)?;
                    builder.set_list_keys(node, keys);
                }
                Some(_) => {
                    self.parse_data_stmt(builder, module, Some(node))?;
                }
                None => {
                    return Err(DslError::UnexpectedEndOfInput {
                        expected: "'}'".to_string(),
                    });
                }
            }
        }
    }

    /// leaf = "leaf" IDENT "{" (type | mandatory | default)* "}"
    fn parse_leaf(
        &mut self,
        builder: &mut SchemaSpecBuilder,
        module: usize,
        parent: Option<SchemaNodeId>,
    ) -> Result<(), DslError> {
        self.expect(&Token::Leaf)?;
        let name = self.expect_ident("leaf name")?;
        self.expect(&Token::LBrace)?;

        let mut yang_type: Option<YangType> = None;
        let mut mandatory = false;
        let mut default: Option<String> = None;

        loop {
            match self.peek_token() {
                Some(Token::RBrace) => {
                    self.advance();
                    break;
                }
                Some(Token::Type) => {
                    let kw_span = self.current_span();
                    self.advance();
                    if yang_type.is_some() {
                        return Err(DslError::DuplicateStatement {
                            keyword: "type".to_string(),
                            span: kw_span,
                        });
                    }
                    yang_type = Some(self.parse_type()?);
                }
                Some(Token::Mandatory) => {
                    self.advance();
                    mandatory = match self.advance() {
                        Some(st) if st.token == Token::True => true,
                        Some(st) if st.token == Token::False => false,
                        Some(st) => {
                            return Err(DslError::UnexpectedToken {
                                expected: "'true' or 'false'".to_string(),
                                found: format!("{} ('{}')", st.token.description(), st.text),
                                span: st.span,
                            })
                        }
                        None => {
                            return Err(DslError::UnexpectedEndOfInput {
                                expected: "'true' or 'false'".to_string(),
                            })
                        }
                    };
                    self.expect(&Token::Semi)?;
                }
                Some(Token::Default) => {
                    self.advance();
                    let value = match self.advance() {
                        Some(st) if st.token == Token::StringLiteral => unquote(&st.text),
                        Some(st)
                            if matches!(
                                st.token,
                                Token::IntegerLiteral | Token::True | Token::False | Token::Ident
                            ) =>
                        {
                            st.text
                        }
                        Some(st) => {
                            return Err(DslError::UnexpectedToken {
                                expected: "default value".to_string(),
                                found: format!("{} ('{}')", st.token.description(), st.text),
                                span: st.span,
                            })
                        }
                        None => {
                            return Err(DslError::UnexpectedEndOfInput {
                                expected: "default value".to_string(),
                            })
                        }
                    };
                    default = Some(value);
                    self.expect(&Token::Semi)?;
                }
                Some(_) => return Err(self.unexpected("leaf statement")),
                None => {
                    return Err(DslError::UnexpectedEndOfInput {
                        expected: "'}'".to_string(),
                    });
                }
            }
        }

        let yang_type = yang_type.ok_or_else(|| DslError::MissingStatement {
            keyword: "type".to_string(),
            owner: format!("leaf '{}'", name.text),
            span: name.span.clone(),
        })?;
        builder.add_node(
            module,
            parent,
            &name.text,
            SchemaNodeKind::Leaf {
                yang_type,
                mandatory,
                default,
            },
        );
        Ok(())
    }

    /// leaf_list = "leaf-list" IDENT "{" type "}"
    fn parse_leaf_list(
        &mut self,
        builder: &mut SchemaSpecBuilder,
        module: usize,
        parent: Option<SchemaNodeId>,
    ) -> Result<(), DslError> {
        self.expect(&Token::LeafList)?;
        let name = self.expect_ident("leaf-list name")?;
        self.expect(&Token::LBrace)?;
        let mut yang_type: Option<YangType> = None;
        loop {
            match self.peek_token() {
                Some(Token::RBrace) => {
                    self.advance();
                    break;
                }
                Some(Token::Type) => {
                    let kw_span = self.current_span();
                    self.advance();
                    if yang_type.is_some() {
                        return Err(DslError::DuplicateStatement {
                            keyword: "type".to_string(),
                            span: kw_span,
                        });
                    }
                    yang_type = Some(self.parse_type()?);
                }
                Some(_) => return Err(self.unexpected("'type'")),
                None => {
                    return Err(DslError::UnexpectedEndOfInput {
                        expected: "'}'".to_string(),
                    });
                }
            }
        }
        let yang_type = yang_type.ok_or_else(|| DslError::MissingStatement {
            keyword: "type".to_string(),
            owner: format!("leaf-list '{}'", name.text),
            span: name.span.clone(),
        })?;
        builder.add_node(
            module,
            parent,
            &name.text,
            SchemaNodeKind::LeafList { yang_type },
        );
        Ok(())
    }

    /// choice = "choice" IDENT "{" case* "}"
    fn parse_choice(
        &mut self,
        builder: &mut SchemaSpecBuilder,
        module: usize,
        parent: Option<SchemaNodeId>,
    ) -> Result<(), DslError> {
        self.expect(&Token::Choice)?;
        let name = self.expect_ident("choice name")?;
        let node = builder.add_node(module, parent, &name.text, SchemaNodeKind::Choice);
        self.expect(&Token::LBrace)?;
        loop {
            match self.peek_token() {
                Some(Token::RBrace) => {
                    self.advance();
                    return Ok(());
                }
                Some(Token::Case) => {
                    self.advance();
                    let case_name = self.expect_ident("case name")?;
                    let case =
                        builder.add_node(module, Some(node), &case_name.text, SchemaNodeKind::Case);
                    self.expect(&Token::LBrace)?;
                    while self.peek_token() != Some(&Token::RBrace) {
                        if self.peek().is_none() {
                            return Err(DslError::UnexpectedEndOfInput {
                                expected: "'}'".to_string(),
                            });
                        }
                        self.parse_data_stmt(builder, module, Some(case))?;
                    }
                    self.expect(&Token::RBrace)?;
                }
                Some(_) => return Err(self.unexpected("'case'")),
                None => {
                    return Err(DslError::UnexpectedEndOfInput {
                        expected: "'}'".to_string(),
                    });
                }
            }
        }
    }

    /// type_spec = IDENT [restrictions] ";"
    ///           | "enumeration" "{" ("enum" IDENT ";")* "}"
    ///           | "leafref" "{" "path" STRING ";" "}"
    fn parse_type(&mut self) -> Result<YangType, DslError> {
        match self.peek_token() {
            Some(Token::Enumeration) => {
                self.advance();
                self.expect(&Token::LBrace)?;
                let mut variants: Vec<String> = Vec::new();
                while self.peek_token() == Some(&Token::Enum) {
                    self.advance();
                    let variant = self.expect_ident("enum variant")?;
                    if variants.contains(&variant.text) {
                        return Err(DslError::CoreModelError {
                            source: ModelError::DuplicateEnumVariant(variant.text),
                            span: variant.span,
                        });
                    }
                    variants.push(variant.text);
                    self.expect(&Token::Semi)?;
                }
                let rbrace = self.expect(&Token::RBrace)?;
                if variants.is_empty() {
                    return Err(DslError::CoreModelError {
                        source: ModelError::EmptyEnumeration,
                        span: rbrace.span,
                    });
                }
                Ok(YangType::Enumeration { variants })
            }
            Some(Token::LeafRef) => {
                self.advance();
                self.expect(&Token::LBrace)?;
                self.expect(&Token::Path)?;
                let path_tok = self.expect_string()?;
                let path = NodePath::parse(&unquote(&path_tok.text)).map_err(|e| {
                    DslError::CoreModelError {
                        source: e,
                        span: path_tok.span.clone(),
                    }
                })?;
                self.expect(&Token::Semi)?;
                self.expect(&Token::RBrace)?;
                Ok(YangType::LeafRef { path })
            }
            _ => {
                let name_tok = self.expect_ident("type name")?;
                let base = YangType::from_name(&name_tok.text).map_err(|e| {
                    DslError::CoreModelError {
                        source: e,
                        span: name_tok.span.clone(),
                    }
                })?;
                if self.peek_token() == Some(&Token::LBrace) {
                    self.advance();
                    let restricted = self.parse_restriction(base)?;
                    self.expect(&Token::RBrace)?;
                    Ok(restricted)
                } else {
                    self.expect(&Token::Semi)?;
                    Ok(base)
                }
            }
        }
    }

    /// restriction = ("range" | "length") INT ".." INT ";"
    fn parse_restriction(&mut self, base: YangType) -> Result<YangType, DslError> {
        match self.peek_token() {
            Some(Token::Range | Token::Length) => {
                self.advance();
                let (min, min_span) = self.expect_integer()?;
                self.expect(&Token::DotDot)?;
                let (max, max_span) = self.expect_integer()?;
                self.expect(&Token::Semi)?;
                let span = Span::new(min_span.start, max_span.end);
                let range = Range::new(min, max).map_err(|e| DslError::CoreModelError {
                    source: e,
                    span: span.clone(),
                })?;
                base.with_range(range)
                    .map_err(|e| DslError::CoreModelError { source: e, span })
            }
            _ => Err(self.unexpected("'range' or 'length'")),
        }
    }
}

/// Strips surrounding quotes and resolves `\"` and `\\` escapes.
fn unquote(text: &str) -> String {
    let inner = text
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(text);
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(escaped) => out.push(escaped),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}
