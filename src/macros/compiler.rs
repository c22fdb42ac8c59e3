//!
//! Compiles `(macro name (params...) body)` definitions into flat template bodies.
//!
//! ## Algorithm
//!
//! The compiler walks the definition once through a [`ValueReader`]. Containers, invocations, and
//! groups push a placeholder expression, compile their children directly after it, and then
//! backfill the placeholder with the final `(self_index, end)` range. No intermediate tree is
//! built.
//!
//! ## Body forms
//!
//! - A bare, unannotated symbol names a parameter and compiles to `Variable`.
//! - `(literal x ...)` quotes its contents.
//! - `(; x ...)` is an expression group, valid as an argument to a variadic parameter.
//! - An unannotated s-expression whose head names a known macro is an invocation.
//! - Anything else is literal data whose children are compiled recursively.

use std::rc::Rc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::expression::Expression;
use super::table::{MacroRef, MacroTable};
use super::types::{Cardinality, Macro, Parameter, ParameterEncoding, TemplateMacro};
use crate::model::{Element, ElementReader, IonType, ValueReader};
use crate::{err_help, err_msg, IonResult};

// Letters, digits, `_` and `$`, not starting with a digit.
static IDENTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").unwrap());

static SYMBOL_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\$[0-9]+$").unwrap());

const RESERVED_WORDS: [&str; 4] = ["null", "true", "false", "nan"];

const MACRO_KEYWORD: &str = "macro";
const LITERAL_FORM: &str = "literal";
const GROUP_FORM: &str = ";";

/// Checks that `name` may be used as a macro or parameter name.
pub fn validate_identifier(name: &str) -> IonResult<()> {
    if !IDENTIFIER.is_match(name) {
        return Err(err_help!(
            Signature,
            format!("'{name}' is not a valid identifier"),
            "identifiers use letters, digits, '_' and '$', and may not start with a digit"
        ));
    }
    if RESERVED_WORDS.contains(&name) || SYMBOL_ID.is_match(name) {
        return Err(err_msg!(Signature, "'{}' is a reserved word", name));
    }
    Ok(())
}

/// Compiles template macros against a macro table.
pub struct TemplateCompiler<'t> {
    table: &'t dyn MacroTable,
}

// Per-definition compilation state.
struct Scope<'s> {
    signature: &'s [Parameter],
    expressions: Vec<Expression>,
}

impl<'t> TemplateCompiler<'t> {
    pub fn new(table: &'t dyn MacroTable) -> Self {
        Self { table }
    }

    /// Compiles the `(macro ...)` s-expression the reader is positioned on.
    pub fn compile<R: ValueReader>(&self, reader: &mut R) -> IonResult<TemplateMacro> {
        if reader.ion_type() != Some(IonType::SExp) || reader.is_null() {
            return Err(err_msg!(Signature, "a macro definition must be an s-expression"));
        }
        reader.step_in()?;

        if reader.next()? != Some(IonType::Symbol) || reader.read_text()? != MACRO_KEYWORD {
            return Err(err_msg!(Signature, "a macro definition must start with 'macro'"));
        }

        let name = match reader.next()? {
            Some(IonType::Symbol) if !reader.is_null() => {
                let name = reader.read_text()?;
                validate_identifier(&name)?;
                Some(name)
            }
            Some(_) if reader.is_null() => None,
            _ => return Err(err_msg!(Signature, "expected a macro name or null")),
        };

        if reader.next()? != Some(IonType::SExp) || reader.is_null() {
            return Err(err_msg!(Signature, "expected a parameter list"));
        }
        let signature = self.compile_signature(reader)?;

        if reader.next()?.is_none() {
            return Err(err_msg!(Signature, "macro has no body"));
        }
        let mut scope = Scope {
            signature: &signature,
            expressions: Vec::new(),
        };
        self.compile_expression(reader, &mut scope)?;
        if reader.next()?.is_some() {
            return Err(err_help!(
                Signature,
                "macro has more than one body expression",
                "wrap multiple values in (values ...)"
            ));
        }
        reader.step_out()?;

        let body: Rc<[Expression]> = scope.expressions.into();
        debug!(name = ?name, parameters = signature.len(), expressions = body.len(), "compiled macro");
        Ok(TemplateMacro {
            name,
            signature,
            body,
        })
    }

    /// Compiles a definition given as a materialised element.
    pub fn compile_element(&self, element: &Element) -> IonResult<TemplateMacro> {
        let elements = std::slice::from_ref(element);
        let mut reader = ElementReader::new(elements);
        reader.next()?;
        self.compile(&mut reader)
    }

    /// Compiles one free-standing expression (typically an invocation) with no parameters in scope.
    pub fn compile_tape<R: ValueReader>(&self, reader: &mut R) -> IonResult<Rc<[Expression]>> {
        let mut scope = Scope {
            signature: &[],
            expressions: Vec::new(),
        };
        self.compile_expression(reader, &mut scope)?;
        Ok(scope.expressions.into())
    }

    pub fn compile_tape_element(&self, element: &Element) -> IonResult<Rc<[Expression]>> {
        let elements = std::slice::from_ref(element);
        let mut reader = ElementReader::new(elements);
        reader.next()?;
        self.compile_tape(&mut reader)
    }

    // ========================================================================
    // SIGNATURE
    // ========================================================================

    fn compile_signature<R: ValueReader>(&self, reader: &mut R) -> IonResult<Vec<Parameter>> {
        let mut signature: Vec<Parameter> = Vec::new();
        // Whether the last parameter already received a sigil.
        let mut sigil_applied = true;
        reader.step_in()?;
        while let Some(ion_type) = reader.next()? {
            if ion_type != IonType::Symbol || reader.is_null() {
                return Err(err_msg!(Signature, "parameter names must be symbols, found {}", ion_type));
            }
            let text = reader.read_text()?;
            if let Some(cardinality) = Cardinality::from_sigil(&text) {
                match signature.last_mut() {
                    Some(parameter) if !sigil_applied => {
                        parameter.cardinality = cardinality;
                        sigil_applied = true;
                    }
                    _ => {
                        return Err(err_help!(
                            Signature,
                            format!("cardinality '{text}' does not follow a parameter"),
                            "write the sigil directly after the parameter it modifies"
                        ))
                    }
                }
                continue;
            }

            let encoding = match reader.annotations() {
                [] => ParameterEncoding::Tagged,
                [annotation] => {
                    let annotation = annotation.as_text().unwrap_or_default();
                    ParameterEncoding::from_annotation(annotation).ok_or_else(|| {
                        err_msg!(Signature, "unsupported parameter encoding '{}'", annotation)
                    })?
                }
                _ => return Err(err_msg!(Signature, "parameter '{}' has more than one encoding", text)),
            };

            // Accept a sigil written as part of the name, as in `x*`.
            let (name, cardinality) = match text.char_indices().last() {
                Some((at, c)) if at > 0 => match Cardinality::from_sigil(&c.to_string()) {
                    Some(cardinality) => (text[..at].to_string(), Some(cardinality)),
                    None => (text, None),
                },
                _ => (text, None),
            };
            validate_identifier(&name)?;
            if signature.iter().any(|p| p.name == name) {
                return Err(err_msg!(Signature, "duplicate parameter '{}'", name));
            }
            sigil_applied = cardinality.is_some();
            signature.push(Parameter::new(name, encoding, cardinality.unwrap_or(Cardinality::One)));
        }
        reader.step_out()?;
        Ok(signature)
    }

    // ========================================================================
    // BODY
    // ========================================================================

    fn compile_expression<R: ValueReader>(&self, reader: &mut R, scope: &mut Scope<'_>) -> IonResult<()> {
        let position = scope.expressions.len();
        let Some(ion_type) = reader.ion_type() else {
            return Err(err_msg!(Internal, "compiler is not positioned on a value"));
        };
        let annotated = !reader.annotations().is_empty();

        match ion_type {
            IonType::Symbol if !annotated && !reader.is_null() => {
                let name = reader.read_text()?;
                let index = scope
                    .signature
                    .iter()
                    .position(|p| p.name == name)
                    .ok_or_else(|| {
                        err_help!(
                            Signature,
                            format!("'{name}' is not a parameter of this macro"),
                            "quote symbol values with (literal ...)"
                        )
                        .at(position)
                    })?;
                scope.expressions.push(Expression::Variable(index));
                Ok(())
            }
            IonType::SExp if !annotated && !reader.is_null() => self.compile_sexp(reader, scope),
            IonType::List | IonType::SExp | IonType::Struct if !reader.is_null() => {
                self.compile_container(reader, scope, ion_type, false)
            }
            _ => {
                scope.expressions.push(Expression::Value {
                    annotations: reader.annotations().to_vec(),
                    value: reader.read_scalar()?,
                });
                Ok(())
            }
        }
    }

    /// Compiles a list, s-expression, or struct into a container range.
    fn compile_container<R: ValueReader>(
        &self,
        reader: &mut R,
        scope: &mut Scope<'_>,
        ion_type: IonType,
        quoted: bool,
    ) -> IonResult<()> {
        let self_index = scope.expressions.len();
        scope.expressions.push(Expression::Container {
            annotations: reader.annotations().to_vec(),
            ion_type,
            self_index,
            end: self_index + 1,
        });
        reader.step_in()?;
        while reader.next()?.is_some() {
            self.compile_child(reader, scope, ion_type, quoted)?;
        }
        reader.step_out()?;
        let end = scope.expressions.len();
        scope.expressions[self_index].set_end(end);
        Ok(())
    }

    fn compile_child<R: ValueReader>(
        &self,
        reader: &mut R,
        scope: &mut Scope<'_>,
        parent: IonType,
        quoted: bool,
    ) -> IonResult<()> {
        if parent == IonType::Struct {
            let name = reader
                .field_name()
                .cloned()
                .ok_or_else(|| err_msg!(Signature, "struct field without a name"))?;
            scope.expressions.push(Expression::FieldName(name));
        }
        if quoted {
            self.compile_quoted(reader, scope)
        } else {
            self.compile_expression(reader, scope)
        }
    }

    fn compile_quoted<R: ValueReader>(&self, reader: &mut R, scope: &mut Scope<'_>) -> IonResult<()> {
        match reader.ion_type() {
            Some(ion_type) if ion_type.is_container() && !reader.is_null() => {
                self.compile_container(reader, scope, ion_type, true)
            }
            Some(_) => {
                scope.expressions.push(Expression::Value {
                    annotations: reader.annotations().to_vec(),
                    value: reader.read_scalar()?,
                });
                Ok(())
            }
            None => Err(err_msg!(Internal, "compiler is not positioned on a value")),
        }
    }

    /// An unannotated s-expression: a special form, an invocation, or literal data.
    fn compile_sexp<R: ValueReader>(&self, reader: &mut R, scope: &mut Scope<'_>) -> IonResult<()> {
        let self_index = scope.expressions.len();
        reader.step_in()?;
        let head = match reader.next()? {
            None => {
                reader.step_out()?;
                scope.expressions.push(Expression::Container {
                    annotations: Vec::new(),
                    ion_type: IonType::SExp,
                    self_index,
                    end: self_index + 1,
                });
                return Ok(());
            }
            Some(IonType::Symbol) if !reader.is_null() && reader.annotations().is_empty() => {
                Some(reader.read_text()?)
            }
            Some(_) => None,
        };

        match head.as_deref() {
            Some(LITERAL_FORM) => self.compile_literal_form(reader, scope, self_index),
            Some(GROUP_FORM) => {
                scope.expressions.push(Expression::ExpressionGroup {
                    self_index,
                    end: self_index + 1,
                });
                while reader.next()?.is_some() {
                    self.compile_expression(reader, scope)?;
                }
                reader.step_out()?;
                let end = scope.expressions.len();
                scope.expressions[self_index].set_end(end);
                Ok(())
            }
            Some(name) if !scope.signature.iter().any(|p| p.name == name) => {
                match self.table.get(&MacroRef::name(name)) {
                    Some(invoked) => self.compile_invocation(reader, scope, invoked, self_index),
                    None => Err(err_help!(
                        Signature,
                        format!("unknown macro '{name}'"),
                        "define the macro before the macros that invoke it"
                    )
                    .at(self_index)),
                }
            }
            _ => {
                // Literal s-expression; the head is already consumed, so compile it in place.
                scope.expressions.push(Expression::Container {
                    annotations: Vec::new(),
                    ion_type: IonType::SExp,
                    self_index,
                    end: self_index + 1,
                });
                self.compile_expression(reader, scope)?;
                while reader.next()?.is_some() {
                    self.compile_expression(reader, scope)?;
                }
                reader.step_out()?;
                let end = scope.expressions.len();
                scope.expressions[self_index].set_end(end);
                Ok(())
            }
        }
    }

    /// `(literal x ...)`: a single quoted value, or a group of them.
    fn compile_literal_form<R: ValueReader>(
        &self,
        reader: &mut R,
        scope: &mut Scope<'_>,
        self_index: usize,
    ) -> IonResult<()> {
        scope.expressions.push(Expression::ExpressionGroup {
            self_index,
            end: self_index + 1,
        });
        let mut count = 0;
        while reader.next()?.is_some() {
            self.compile_quoted(reader, scope)?;
            count += 1;
        }
        reader.step_out()?;
        let end = scope.expressions.len();
        if count == 1 {
            // Unwrap the group: shift the single quoted value into the placeholder's slot.
            scope.expressions.remove(self_index);
            for expression in &mut scope.expressions[self_index..] {
                shift_ranges(expression, 1);
            }
        } else {
            scope.expressions[self_index].set_end(end);
        }
        Ok(())
    }

    fn compile_invocation<R: ValueReader>(
        &self,
        reader: &mut R,
        scope: &mut Scope<'_>,
        invoked: Rc<Macro>,
        self_index: usize,
    ) -> IonResult<()> {
        scope.expressions.push(Expression::MacroInvocation {
            invoked: Rc::clone(&invoked),
            self_index,
            end: self_index + 1,
        });
        let signature = invoked.signature();
        let name = invoked.name().unwrap_or("<anonymous>").to_string();
        let mut argument = 0;
        while reader.next()?.is_some() {
            let Some(parameter) = signature.get(argument) else {
                return Err(err_msg!(
                    Signature,
                    "too many arguments for '{}': expected at most {}",
                    name,
                    signature.len()
                )
                .at(self_index));
            };
            let start = scope.expressions.len();
            self.compile_expression(reader, scope)?;
            if matches!(scope.expressions[start], Expression::ExpressionGroup { .. })
                && parameter.cardinality.max() == Some(1)
            {
                return Err(err_msg!(
                    Signature,
                    "parameter '{}' of '{}' does not accept an expression group",
                    parameter.name,
                    name
                )
                .at(start));
            }
            argument += 1;
        }
        reader.step_out()?;
        if let Some(missing) = signature[argument.min(signature.len())..]
            .iter()
            .find(|p| !p.cardinality.is_optional())
        {
            return Err(err_msg!(
                Signature,
                "missing argument for parameter '{}' of '{}'",
                missing.name,
                name
            )
            .at(self_index));
        }
        let end = scope.expressions.len();
        scope.expressions[self_index].set_end(end);
        Ok(())
    }
}

fn shift_ranges(expression: &mut Expression, by: usize) {
    match expression {
        Expression::Container { self_index, end, .. }
        | Expression::MacroInvocation { self_index, end, .. }
        | Expression::EExpression { self_index, end, .. }
        | Expression::ExpressionGroup { self_index, end } => {
            *self_index -= by;
            *end -= by;
        }
        _ => {}
    }
}

/// Convenience for callers holding symbols: builds a parameter-free tape from an element.
pub fn compile_invocation(table: &dyn MacroTable, element: &Element) -> IonResult<Rc<[Expression]>> {
    TemplateCompiler::new(table).compile_tape_element(element)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::macros::MutableMacroTable;
    use crate::model::{SymbolToken, Value};

    fn sym(text: &str) -> Element {
        Element::symbol(text)
    }

    #[test]
    fn identifiers() {
        assert!(validate_identifier("foo_bar9").is_ok());
        assert!(validate_identifier("9lives").is_err());
        assert!(validate_identifier("null").is_err());
        assert!(validate_identifier("$12").is_err());
        assert!(validate_identifier("a-b").is_err());
    }

    #[test]
    fn single_literal_unwraps_its_group() {
        let table = MutableMacroTable::new();
        let definition = Element::sexp([
            sym("macro"),
            sym("m"),
            Element::sexp([]),
            Element::list([
                Element::sexp([sym("literal"), Element::list([sym("x")])]),
                Element::int(2),
            ]),
        ]);
        let compiled = TemplateCompiler::new(&table).compile_element(&definition).unwrap();
        let body = compiled.body;
        assert_eq!(body.len(), 4);
        assert_eq!(body[0].child_range(), Some((1, 4)));
        assert_eq!(body[1].child_range(), Some((2, 3)));
        assert!(matches!(&body[2], Expression::Value { value: Value::Symbol(SymbolToken::Text(t)), .. } if t == "x"));
    }
}
