//! JSON stand-ins for template definition language forms.
//!
//! Arrays are s-expressions, objects are structs, and strings are symbols unless they start with
//! `'`, in which case the rest is a string. A symbol written `ann::name` carries the annotation
//! `ann`, which is how parameter encodings are spelled (`"uint8::x"`). Names in the system
//! namespace (`$ion::...`) are left whole.

use serde_json::Value as Json;

use crate::macros::SYSTEM_NAMESPACE_PREFIX;
use crate::model::{Element, ElementData, Int, IonType, SymbolToken, Value};
use crate::{err_msg, IonResult};

pub fn to_element(json: &Json) -> IonResult<Element> {
    let element = match json {
        Json::Null => Element::scalar(Value::Null(IonType::Null)),
        Json::Bool(b) => Element::scalar(Value::Bool(*b)),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Element::int(i)
            } else if let Some(u) = n.as_u64() {
                Element::scalar(Value::Int(Int::from_big(u.into())))
            } else {
                let f = n
                    .as_f64()
                    .ok_or_else(|| err_msg!(Encoding, "unsupported JSON number {}", n))?;
                Element::scalar(Value::Float(f))
            }
        }
        Json::String(text) => string_or_symbol(text),
        Json::Array(items) => Element::sexp(items.iter().map(to_element).collect::<IonResult<Vec<_>>>()?),
        Json::Object(fields) => {
            let fields = fields
                .iter()
                .map(|(name, value)| Ok((SymbolToken::text(name.as_str()), to_element(value)?)))
                .collect::<IonResult<Vec<_>>>()?;
            Element::new(ElementData::Struct(fields))
        }
    };
    Ok(element)
}

fn string_or_symbol(text: &str) -> Element {
    if let Some(string) = text.strip_prefix('\'') {
        return Element::string(string);
    }
    if !text.starts_with(SYSTEM_NAMESPACE_PREFIX) {
        if let Some((annotation, name)) = text.split_once("::") {
            return Element::symbol(name).with_annotations([annotation]);
        }
    }
    Element::symbol(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn arrays_become_sexps() {
        let element = to_element(&json!(["make_string", "'a", 1])).unwrap();
        assert_eq!(
            element,
            Element::sexp([Element::symbol("make_string"), Element::string("a"), Element::int(1)])
        );
    }

    #[test]
    fn annotated_parameter_names() {
        let element = to_element(&json!("uint8::x")).unwrap();
        assert_eq!(element, Element::symbol("x").with_annotations(["uint8"]));
        let system = to_element(&json!("$ion::values")).unwrap();
        assert_eq!(system, Element::symbol("$ion::values"));
    }
}
