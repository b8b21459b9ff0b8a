//! Client query parser
//!
//! Builds [`QueryDocument`] trees from executable GraphQL text. Parsing never
//! fails outright: every node completed (or partly completed) before the
//! first error stays in the tree, and the error is returned next to it.

use tracing::warn;

use super::{
    Argument, FragmentDefinition, Operation, OperationKind, QueryDocument, SelectionKind,
    SelectionNode,
};
use crate::error::{InsightError, Result};
use crate::graph::loader::parse_type;
use crate::lexer::{DEFAULT_MAX_NESTING, TokenKind, TokenStream};

/// Parse outcome: the (possibly partial) document and the first error
#[derive(Debug)]
pub struct ParsedQuery {
    pub document: QueryDocument,
    pub error: Option<InsightError>,
}

impl ParsedQuery {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// Parse query text, recovering whatever precedes the first error
pub fn parse_query(text: &str) -> ParsedQuery {
    parse_query_with_limit(text, DEFAULT_MAX_NESTING)
}

/// Like [`parse_query`], failing at the first selection set or value
/// nested deeper than `max_nesting`
pub fn parse_query_with_limit(text: &str, max_nesting: usize) -> ParsedQuery {
    let (stream, lex_error) = TokenStream::from_source(text);
    let mut parser = QueryParser {
        stream: stream.with_max_nesting(max_nesting),
        document: QueryDocument::default(),
    };

    let parse_error = if parser.stream.is_eof() && lex_error.is_none() {
        Some(InsightError::parse(1, 1, "query document is empty"))
    } else {
        parser.parse_document().err()
    };

    // The lexer stops at its error, so the parser then trips over the
    // truncated input; report whichever comes first in the text.
    let error = match (lex_error, parse_error) {
        (Some(lex), Some(parse)) if parse.position() < lex.position() => Some(parse),
        (Some(lex), _) => Some(lex),
        (lex, parse) => lex.or(parse),
    };

    if let Some(err) = &error {
        warn!(error = %err, "recovered partial query tree");
    }

    ParsedQuery {
        document: parser.document,
        error,
    }
}

struct QueryParser {
    stream: TokenStream,
    document: QueryDocument,
}

impl QueryParser {
    fn parse_document(&mut self) -> Result<()> {
        while let Some(token) = self.stream.peek() {
            if token.is_punct("{") {
                self.parse_operation(OperationKind::Query, false)?;
            } else if token.kind == TokenKind::Name {
                if let Some(kind) = OperationKind::from_keyword(&token.value) {
                    self.stream.next();
                    self.parse_operation(kind, true)?;
                } else if token.value == "fragment" {
                    self.stream.next();
                    self.parse_fragment_definition()?;
                } else {
                    return Err(self.stream.unexpected("operation keyword or 'fragment'"));
                }
            } else {
                return Err(self.stream.unexpected("operation or fragment definition"));
            }
        }
        Ok(())
    }

    fn parse_operation(&mut self, kind: OperationKind, keyword: bool) -> Result<()> {
        let mut operation = Operation {
            kind,
            ..Operation::default()
        };

        if keyword {
            if let Some(token) = self.stream.peek() {
                if token.kind == TokenKind::Name {
                    operation.name = Some(token.value.clone());
                    self.stream.next();
                }
            }
            if let Err(err) = self.parse_variable_definitions() {
                self.document.operations.push(operation);
                return Err(err);
            }
            if let Err(err) = self.stream.parse_directives() {
                self.document.operations.push(operation);
                return Err(err);
            }
        }

        let result = self.parse_selection_set(&mut operation.selections);
        self.document.operations.push(operation);
        result
    }

    fn parse_variable_definitions(&mut self) -> Result<()> {
        if !self.stream.eat_punct("(") {
            return Ok(());
        }
        while !self.stream.eat_punct(")") {
            self.stream.expect_punct("$")?;
            self.stream.expect_name()?;
            self.stream.expect_punct(":")?;
            parse_type(&mut self.stream)?;
            if self.stream.eat_punct("=") {
                self.stream.parse_value()?;
            }
            self.stream.parse_directives()?;
        }
        Ok(())
    }

    fn parse_fragment_definition(&mut self) -> Result<()> {
        let name = self.stream.expect_name()?;
        if !self.stream.at_name("on") {
            return Err(self.stream.unexpected("'on'"));
        }
        self.stream.next();
        let type_condition = self.stream.expect_name()?;
        self.stream.parse_directives()?;

        let mut fragment = FragmentDefinition {
            name: name.value,
            type_condition: type_condition.value,
            selections: Vec::new(),
        };
        let result = self.parse_selection_set(&mut fragment.selections);
        self.document.fragments.push(fragment);
        result
    }

    /// `{ selection* }`, appending each selection to `out` as it is built
    fn parse_selection_set(&mut self, out: &mut Vec<SelectionNode>) -> Result<()> {
        if self.stream.at_punct("{") {
            self.stream.descend()?;
        }
        self.stream.expect_punct("{")?;
        loop {
            if self.stream.eat_punct("}") {
                self.stream.ascend();
                return Ok(());
            }
            if self.stream.is_eof() {
                return Err(self.stream.unexpected("'}'"));
            }
            self.parse_selection(out)?;
        }
    }

    fn parse_selection(&mut self, out: &mut Vec<SelectionNode>) -> Result<()> {
        if self.stream.at_punct("...") {
            return self.parse_fragment_selection(out);
        }

        let first = self.stream.expect_name()?;
        let mut node = if self.stream.eat_punct(":") {
            let name = self.stream.expect_name()?;
            let mut node = SelectionNode::field(name.value, first.line, first.column);
            node.alias = Some(first.value);
            node
        } else {
            SelectionNode::field(first.value, first.line, first.column)
        };

        let result = self.parse_field_tail(&mut node);
        out.push(node);
        result
    }

    fn parse_field_tail(&mut self, node: &mut SelectionNode) -> Result<()> {
        node.arguments = self
            .stream
            .parse_arguments()?
            .into_iter()
            .map(Argument::from)
            .collect();
        self.stream.parse_directives()?;
        if self.stream.at_punct("{") {
            self.parse_selection_set(&mut node.children)?;
        }
        Ok(())
    }

    fn parse_fragment_selection(&mut self, out: &mut Vec<SelectionNode>) -> Result<()> {
        let dots = self.stream.expect_punct("...")?;

        // `...Name` spread; `on` always starts a type condition
        if let Some(token) = self.stream.peek() {
            if token.kind == TokenKind::Name && token.value != "on" {
                let name = token.value.clone();
                self.stream.next();
                let mut node = SelectionNode::field(name, dots.line, dots.column);
                node.kind = SelectionKind::FragmentSpread;
                out.push(node);
                self.stream.parse_directives()?;
                return Ok(());
            }
        }

        let type_condition = if self.stream.at_name("on") {
            self.stream.next();
            Some(self.stream.expect_name()?.value)
        } else {
            None
        };

        let mut node = SelectionNode::field("...", dots.line, dots.column);
        node.kind = SelectionKind::InlineFragment { type_condition };

        let result = self
            .stream
            .parse_directives()
            .and_then(|_| self.parse_selection_set(&mut node.children));
        out.push(node);
        result
    }
}
