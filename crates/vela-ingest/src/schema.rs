//! Nominal schema trees and their serialized text form.
//!
//! A [`Schema`] is a rooted tree of typed nodes with named, ordered
//! children. Table specifications carry schemas as strings (for example
//! `ROW<id:int, event:string, items:list<string>, flag:bool>`); this module
//! parses that form, prints the canonical round-trip form, and supports the
//! column add/remove operations the ingestion pipeline performs when it
//! normalizes a table for time.
//!
//! The reserved [`TIME_COLUMN`] (`_time_`) is a 64-bit integer holding
//! seconds since the Unix epoch. After time normalization every effective
//! schema contains exactly one `_time_` column and at most one column per
//! name.

use std::fmt;

use snafu::prelude::*;

/// Name of the reserved time column present on every effective schema.
pub const TIME_COLUMN: &str = "_time_";

/// Scalar and container kinds a schema node can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Bool,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    String,
    List,
    Map,
    /// The root node of a schema.
    Row,
}

impl TypeKind {
    /// Canonical lowercase name used by the serialized form.
    pub fn canonical(self) -> &'static str {
        match self {
            TypeKind::Bool => "bool",
            TypeKind::Byte => "byte",
            TypeKind::Short => "short",
            TypeKind::Int => "int",
            TypeKind::Long => "long",
            TypeKind::Float => "float",
            TypeKind::Double => "double",
            TypeKind::String => "string",
            TypeKind::List => "list",
            TypeKind::Map => "map",
            TypeKind::Row => "ROW",
        }
    }

    fn from_name(name: &str) -> Option<TypeKind> {
        // Accept the aliases the wire form has used historically.
        Some(match name.to_ascii_lowercase().as_str() {
            "bool" | "boolean" => TypeKind::Bool,
            "byte" | "tinyint" => TypeKind::Byte,
            "short" | "smallint" => TypeKind::Short,
            "int" | "integer" => TypeKind::Int,
            "long" | "bigint" => TypeKind::Long,
            "float" | "real" => TypeKind::Float,
            "double" => TypeKind::Double,
            "string" | "varchar" => TypeKind::String,
            _ => return None,
        })
    }
}

/// One node of a schema tree: a kind plus named, ordered children.
///
/// Scalar nodes have no children; `list` has one unnamed child, `map` has
/// two (key, value).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeNode {
    name: String,
    kind: TypeKind,
    children: Vec<TypeNode>,
}

impl TypeNode {
    /// Build a scalar node.
    pub fn scalar(name: impl Into<String>, kind: TypeKind) -> TypeNode {
        TypeNode {
            name: name.into(),
            kind,
            children: Vec::new(),
        }
    }

    /// Build a `list<element>` node.
    pub fn list(name: impl Into<String>, element: TypeNode) -> TypeNode {
        TypeNode {
            name: name.into(),
            kind: TypeKind::List,
            children: vec![element],
        }
    }

    /// Build a `map<key, value>` node.
    pub fn map(name: impl Into<String>, key: TypeNode, value: TypeNode) -> TypeNode {
        TypeNode {
            name: name.into(),
            kind: TypeKind::Map,
            children: vec![key, value],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    /// Children in declaration order.
    pub fn children(&self) -> &[TypeNode] {
        &self.children
    }

    fn write_type(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TypeKind::List => {
                write!(f, "list<")?;
                self.children[0].write_type(f)?;
                write!(f, ">")
            }
            TypeKind::Map => {
                write!(f, "map<")?;
                self.children[0].write_type(f)?;
                write!(f, ",")?;
                self.children[1].write_type(f)?;
                write!(f, ">")
            }
            kind => write!(f, "{}", kind.canonical()),
        }
    }
}

/// Errors raised while parsing or editing schemas.
#[derive(Debug, Snafu)]
pub enum SchemaError {
    /// The serialized form could not be parsed.
    #[snafu(display("Invalid schema text at offset {offset}: {detail}"))]
    Invalid {
        /// Byte offset where parsing stopped.
        offset: usize,
        /// What the parser expected or found.
        detail: String,
    },

    /// Adding a column whose name already exists.
    #[snafu(display("Duplicate column name: {column}"))]
    DuplicateColumn { column: String },

    /// Removing or referencing a column that is not in the schema.
    #[snafu(display("Unknown column: {column}"))]
    UnknownColumn { column: String },
}

/// A rooted schema: the `ROW<...>` node of a type tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<TypeNode>,
}

impl Schema {
    /// Parse the serialized form, e.g. `ROW<id:int, items:list<string>>`.
    pub fn parse(input: &str) -> Result<Schema, SchemaError> {
        Parser::new(input).schema()
    }

    /// Number of top-level columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Column by position.
    pub fn child(&self, index: usize) -> &TypeNode {
        &self.columns[index]
    }

    /// Columns in declaration order.
    pub fn columns(&self) -> &[TypeNode] {
        &self.columns
    }

    /// Position and node of a named column.
    pub fn column(&self, name: &str) -> Option<(usize, &TypeNode)> {
        self.columns
            .iter()
            .enumerate()
            .find(|(_, c)| c.name == name)
    }

    /// Append a column; the name must not already exist.
    pub fn add_column(&mut self, node: TypeNode) -> Result<(), SchemaError> {
        ensure!(
            self.column(&node.name).is_none(),
            DuplicateColumnSnafu { column: &node.name }
        );
        self.columns.push(node);
        Ok(())
    }

    /// Remove a column by name.
    pub fn remove_column(&mut self, name: &str) -> Result<TypeNode, SchemaError> {
        match self.column(name) {
            Some((index, _)) => Ok(self.columns.remove(index)),
            None => UnknownColumnSnafu { column: name }.fail(),
        }
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ROW<")?;
        for (i, col) in self.columns.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}:", col.name)?;
            col.write_type(f)?;
        }
        write!(f, ">")
    }
}

/// Recursive-descent parser over the serialized schema form.
struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Parser<'a> {
        Parser { input, pos: 0 }
    }

    fn schema(mut self) -> Result<Schema, SchemaError> {
        self.skip_ws();
        self.keyword("ROW")?;
        self.expect('<')?;

        let mut schema = Schema {
            columns: Vec::new(),
        };
        loop {
            self.skip_ws();
            let name = self.identifier()?;
            self.expect(':')?;
            let node = self.node(name)?;
            schema.add_column(node)?;

            self.skip_ws();
            match self.peek() {
                Some(',') => {
                    self.pos += 1;
                }
                Some('>') => {
                    self.pos += 1;
                    break;
                }
                other => {
                    return InvalidSnafu {
                        offset: self.pos,
                        detail: format!("expected ',' or '>', found {other:?}"),
                    }
                    .fail();
                }
            }
        }

        self.skip_ws();
        ensure!(
            self.pos == self.input.len(),
            InvalidSnafu {
                offset: self.pos,
                detail: "trailing input after closing '>'".to_string(),
            }
        );
        Ok(schema)
    }

    fn node(&mut self, name: String) -> Result<TypeNode, SchemaError> {
        self.skip_ws();
        let type_name = self.identifier()?;
        match type_name.to_ascii_lowercase().as_str() {
            "list" => {
                self.expect('<')?;
                let element = self.node(String::new())?;
                self.expect('>')?;
                Ok(TypeNode::list(name, element))
            }
            "map" => {
                self.expect('<')?;
                let key = self.node(String::new())?;
                self.expect(',')?;
                let value = self.node(String::new())?;
                self.expect('>')?;
                Ok(TypeNode::map(name, key, value))
            }
            _ => match TypeKind::from_name(&type_name) {
                Some(kind) => Ok(TypeNode::scalar(name, kind)),
                None => InvalidSnafu {
                    offset: self.pos,
                    detail: format!("unknown type name {type_name:?}"),
                }
                .fail(),
            },
        }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
    }

    fn keyword(&mut self, word: &str) -> Result<(), SchemaError> {
        let rest = &self.input[self.pos..];
        if rest.len() >= word.len() && rest[..word.len()].eq_ignore_ascii_case(word) {
            self.pos += word.len();
            Ok(())
        } else {
            InvalidSnafu {
                offset: self.pos,
                detail: format!("expected keyword {word:?}"),
            }
            .fail()
        }
    }

    fn expect(&mut self, c: char) -> Result<(), SchemaError> {
        self.skip_ws();
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            Ok(())
        } else {
            InvalidSnafu {
                offset: self.pos,
                detail: format!("expected {c:?}, found {:?}", self.peek()),
            }
            .fail()
        }
    }

    fn identifier(&mut self) -> Result<String, SchemaError> {
        self.skip_ws();
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
        ensure!(
            self.pos > start,
            InvalidSnafu {
                offset: start,
                detail: "expected an identifier".to_string(),
            }
        );
        Ok(self.input[start..self.pos].to_string())
    }
}
