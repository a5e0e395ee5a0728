use logos::Logos;

/// Tokens produced by the yang-lite lexer.
///
/// Whitespace and comments are skipped automatically by logos.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*([^*]|\*[^/])*\*/")]
pub enum Token {
    // -- Keywords --
    #[token("module")]
    Module,

    #[token("namespace")]
    Namespace,

    #[token("prefix")]
    Prefix,

    #[token("revision")]
    Revision,

    #[token("feature")]
    Feature,

    #[token("container")]
    Container,

    #[token("list")]
    List,

    #[token("leaf-list")]
    LeafList,

    #[token("leaf")]
    Leaf,

    #[token("choice")]
    Choice,

    #[token("case")]
    Case,

    #[token("key")]
    Key,

    #[token("type")]
    Type,

    #[token("mandatory")]
    Mandatory,

    #[token("default")]
    Default,

    #[token("presence")]
    Presence,

    #[token("range")]
    Range,

    #[token("length")]
    Length,

    #[token("enumeration")]
    Enumeration,

    #[token("enum")]
    Enum,

    #[token("leafref")]
    LeafRef,

    #[token("path")]
    Path,

    #[token("true")]
    True,

    #[token("false")]
    False,

    // -- Punctuation --
    #[token("{")]
    LBrace,

    #[token("}")]
    RBrace,

    #[token(";")]
    Semi,

    #[token(":")]
    Colon,

    #[token("..")]
    DotDot,

    // -- Literals --
    /// A double-quoted string literal, e.g. `"urn:example"`.
    #[regex(r#""([^"\\]|\\.)*""#)]
    StringLiteral,

    /// An integer literal, optionally negative, e.g. `42` or `-10`.
    #[regex(r"-?[0-9]+", priority = 3)]
    IntegerLiteral,

    // -- Identifiers --
    /// An identifier: letters, digits, underscores and hyphens, starting
    /// with a letter or underscore. Must come after keywords so logos
    /// prefers keyword tokens.
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_-]*")]
    Ident,
}

impl Token {
    /// Returns a human-readable description of this token kind.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Module => "'module'",
            Self::Namespace => "'namespace'",
            Self::Prefix => "'prefix'",
            Self::Revision => "'revision'",
            Self::Feature => "'feature'",
            Self::Container => "'container'",
            Self::List => "'list'",
            Self::LeafList => "'leaf-list'",
            Self::Leaf => "'leaf'",
            Self::Choice => "'choice'",
            Self::Case => "'case'",
            Self::Key => "'key'",
            Self::Type => "'type'",
            Self::Mandatory => "'mandatory'",
            Self::Default => "'default'",
            Self::Presence => "'presence'",
            Self::Range => "'range'",
            Self::Length => "'length'",
            Self::Enumeration => "'enumeration'",
            Self::Enum => "'enum'",
            Self::LeafRef => "'leafref'",
            Self::Path => "'path'",
            Self::True => "'true'",
            Self::False => "'false'",
            Self::LBrace => "'{'",
            Self::RBrace => "'}'",
            Self::Semi => "';'",
            Self::Colon => "':'",
            Self::DotDot => "'..'",
            Self::StringLiteral => "string literal",
            Self::IntegerLiteral => "integer literal",
            Self::Ident => "identifier",
        }
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}
