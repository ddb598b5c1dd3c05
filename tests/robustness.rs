//! Property tests: hostile input may be rejected, never panic.

use proptest::prelude::*;

use texweave::config::Config;
use texweave::ir::CitationRegistry;
use texweave::origin::OriginMap;
use texweave::{bib, lexer, parser, Diagnostics};

proptest! {
    #[test]
    fn lexer_never_panics(src in ".{0,400}") {
        let _ = lexer::lex(&src, &OriginMap::new());
    }

    #[test]
    fn lexer_with_latex_flavor_never_panics(
        src in r"([a-z \n]|\\[a-z]{1,8}|\{|\}|\$|%|&|~|\\\\){0,200}"
    ) {
        let _ = lexer::lex(&src, &OriginMap::new());
    }

    #[test]
    fn parser_never_panics(
        src in r"([a-z \n]|\\(section|begin\{theorem\}|end\{theorem\}|item|label\{x\}|ref\{x\})|\{|\}){0,120}"
    ) {
        let origins = OriginMap::new();
        if let Ok(tokens) = lexer::lex(&src, &origins) {
            let _ = parser::parse(&tokens, &Config::default(), &origins);
        }
    }

    #[test]
    fn plain_text_lexes_to_a_single_text_token(
        body in "[a-zA-Z0-9,.;:!? ]{0,80}"
    ) {
        let src = format!("a{body}");
        let tokens = lexer::lex(&src, &OriginMap::new()).unwrap();
        prop_assert_eq!(tokens.len(), 1);
        match &tokens[0].kind {
            lexer::TokenKind::Text(text) => prop_assert_eq!(text, &src),
            other => prop_assert!(false, "expected text, got {:?}", other),
        }
    }

    #[test]
    fn bib_parser_never_panics(src in ".{0,400}") {
        let mut registry = CitationRegistry::new();
        let mut diags = Diagnostics::new();
        bib::parse_str(&src, "fuzz.bib", &mut registry, &mut diags);
    }
}
