//! Materialised values and the streaming reader contract consumed by the template compiler.

use std::fmt;

use super::{IonType, SymbolToken, Value};
use crate::{err_msg, IonResult};

/// A fully materialised Ion value with its annotations.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub annotations: Vec<SymbolToken>,
    pub data: ElementData,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElementData {
    Scalar(Value),
    List(Vec<Element>),
    SExp(Vec<Element>),
    Struct(Vec<(SymbolToken, Element)>),
}

impl Element {
    pub fn new(data: ElementData) -> Self {
        Self {
            annotations: Vec::new(),
            data,
        }
    }

    pub fn scalar(value: Value) -> Self {
        Self::new(ElementData::Scalar(value))
    }

    pub fn int(value: i64) -> Self {
        Self::scalar(Value::int(value))
    }

    pub fn string(text: impl Into<String>) -> Self {
        Self::scalar(Value::string(text))
    }

    pub fn symbol(text: impl Into<String>) -> Self {
        Self::scalar(Value::symbol(text))
    }

    pub fn list(children: impl IntoIterator<Item = Element>) -> Self {
        Self::new(ElementData::List(children.into_iter().collect()))
    }

    pub fn sexp(children: impl IntoIterator<Item = Element>) -> Self {
        Self::new(ElementData::SExp(children.into_iter().collect()))
    }

    pub fn structure<K: Into<SymbolToken>>(fields: impl IntoIterator<Item = (K, Element)>) -> Self {
        Self::new(ElementData::Struct(
            fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    pub fn with_annotations<A: Into<SymbolToken>>(mut self, annotations: impl IntoIterator<Item = A>) -> Self {
        self.annotations = annotations.into_iter().map(Into::into).collect();
        self
    }

    pub fn ion_type(&self) -> IonType {
        match &self.data {
            ElementData::Scalar(value) => value.ion_type(),
            ElementData::List(_) => IonType::List,
            ElementData::SExp(_) => IonType::SExp,
            ElementData::Struct(_) => IonType::Struct,
        }
    }

    pub fn as_scalar(&self) -> Option<&Value> {
        match &self.data {
            ElementData::Scalar(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for annotation in &self.annotations {
            write!(f, "{annotation}::")?;
        }
        match &self.data {
            ElementData::Scalar(value) => write!(f, "{value}"),
            ElementData::List(children) => {
                write!(f, "[")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{child}")?;
                }
                write!(f, "]")
            }
            ElementData::SExp(children) => {
                write!(f, "(")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{child}")?;
                }
                write!(f, ")")
            }
            ElementData::Struct(fields) => {
                write!(f, "{{")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {value}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

// ============================================================================
// STREAMING READER CONTRACT
// ============================================================================

/// A pull-based value reader, positioned one value at a time.
///
/// `next` advances to the next value at the current depth and returns its type, or `None` at the
/// end of the current container (or stream).
pub trait ValueReader {
    fn next(&mut self) -> IonResult<Option<IonType>>;
    fn ion_type(&self) -> Option<IonType>;
    fn is_null(&self) -> bool;
    fn annotations(&self) -> &[SymbolToken];
    fn field_name(&self) -> Option<&SymbolToken>;
    /// Reads the current value; fails when positioned on a non-null container.
    fn read_scalar(&self) -> IonResult<Value>;
    fn step_in(&mut self) -> IonResult<()>;
    fn step_out(&mut self) -> IonResult<()>;
    fn depth(&self) -> usize;

    /// Convenience: the current value's text if it is a symbol or string.
    fn read_text(&self) -> IonResult<String> {
        let value = self.read_scalar()?;
        value
            .as_text()
            .map(str::to_string)
            .ok_or_else(|| err_msg!(Signature, "expected text, found {}", value.ion_type()))
    }
}

#[derive(Debug, Clone, Copy)]
enum Level<'a> {
    Sequence(&'a [Element]),
    Fields(&'a [(SymbolToken, Element)]),
}

impl<'a> Level<'a> {
    fn len(&self) -> usize {
        match *self {
            Level::Sequence(items) => items.len(),
            Level::Fields(fields) => fields.len(),
        }
    }

    fn get(&self, index: usize) -> (Option<&'a SymbolToken>, &'a Element) {
        match *self {
            Level::Sequence(items) => (None, &items[index]),
            Level::Fields(fields) => (Some(&fields[index].0), &fields[index].1),
        }
    }
}

/// A [`ValueReader`] over a slice of materialised elements.
#[derive(Debug)]
pub struct ElementReader<'a> {
    // (level, index of the next value to visit)
    stack: Vec<(Level<'a>, usize)>,
    current: Option<(Option<&'a SymbolToken>, &'a Element)>,
}

impl<'a> ElementReader<'a> {
    pub fn new(elements: &'a [Element]) -> Self {
        Self {
            stack: vec![(Level::Sequence(elements), 0)],
            current: None,
        }
    }
}

impl ValueReader for ElementReader<'_> {
    fn next(&mut self) -> IonResult<Option<IonType>> {
        let Some((level, index)) = self.stack.last_mut() else {
            return Err(err_msg!(Internal, "element reader has no open level"));
        };
        if *index >= level.len() {
            self.current = None;
            return Ok(None);
        }
        let item = level.get(*index);
        *index += 1;
        self.current = Some(item);
        Ok(Some(item.1.ion_type()))
    }

    fn ion_type(&self) -> Option<IonType> {
        self.current.map(|(_, element)| element.ion_type())
    }

    fn is_null(&self) -> bool {
        matches!(
            self.current,
            Some((_, Element { data: ElementData::Scalar(Value::Null(_)), .. }))
        )
    }

    fn annotations(&self) -> &[SymbolToken] {
        match self.current {
            Some((_, element)) => &element.annotations,
            None => &[],
        }
    }

    fn field_name(&self) -> Option<&SymbolToken> {
        self.current.and_then(|(name, _)| name)
    }

    fn read_scalar(&self) -> IonResult<Value> {
        match self.current {
            Some((_, Element { data: ElementData::Scalar(value), .. })) => Ok(value.clone()),
            Some((_, element)) => Err(err_msg!(
                Encoding,
                "cannot read a {} as a scalar",
                element.ion_type()
            )),
            None => Err(err_msg!(Encoding, "the reader is not positioned on a value")),
        }
    }

    fn step_in(&mut self) -> IonResult<()> {
        let level = match self.current {
            Some((_, element)) => match &element.data {
                ElementData::List(items) | ElementData::SExp(items) => Level::Sequence(items),
                ElementData::Struct(fields) => Level::Fields(fields),
                ElementData::Scalar(value) => {
                    return Err(err_msg!(Encoding, "cannot step into a {}", value.ion_type()))
                }
            },
            None => return Err(err_msg!(Encoding, "the reader is not positioned on a container")),
        };
        self.stack.push((level, 0));
        self.current = None;
        Ok(())
    }

    fn step_out(&mut self) -> IonResult<()> {
        if self.stack.len() <= 1 {
            return Err(err_msg!(Encoding, "cannot step out of the top level"));
        }
        self.stack.pop();
        self.current = None;
        Ok(())
    }

    fn depth(&self) -> usize {
        self.stack.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_walks_nested_containers() {
        let elements = vec![
            Element::sexp([Element::symbol("a"), Element::list([Element::int(1)])]),
            Element::structure([("k", Element::string("v"))]),
        ];
        let mut reader = ElementReader::new(&elements);
        assert_eq!(reader.next().unwrap(), Some(IonType::SExp));
        reader.step_in().unwrap();
        assert_eq!(reader.depth(), 1);
        assert_eq!(reader.next().unwrap(), Some(IonType::Symbol));
        assert_eq!(reader.read_text().unwrap(), "a");
        assert_eq!(reader.next().unwrap(), Some(IonType::List));
        assert_eq!(reader.next().unwrap(), None);
        reader.step_out().unwrap();
        assert_eq!(reader.next().unwrap(), Some(IonType::Struct));
        reader.step_in().unwrap();
        reader.next().unwrap();
        assert_eq!(reader.field_name(), Some(&SymbolToken::text("k")));
        reader.step_out().unwrap();
        assert_eq!(reader.next().unwrap(), None);
        assert!(reader.step_out().is_err());
    }
}
