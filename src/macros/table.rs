//! Macro references and the tables that resolve them.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use super::system::{SystemMacro, ALL_SYSTEM_MACROS, SYSTEM_NAMESPACE_PREFIX};
use super::types::{Macro, TemplateMacro};
use crate::{err_help, IonResult};

/// How an invocation names the macro it calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MacroRef {
    /// An address in the active (user) macro table.
    Address(usize),
    /// A name, resolved against user macros first and then the system catalogue.
    Name(String),
    /// A system macro, as written by an `EF` e-expression.
    System(SystemMacro),
}

impl MacroRef {
    pub fn name(name: impl Into<String>) -> Self {
        MacroRef::Name(name.into())
    }
}

impl fmt::Display for MacroRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MacroRef::Address(address) => write!(f, "#{address}"),
            MacroRef::Name(name) => write!(f, "{name}"),
            MacroRef::System(system) => write!(f, "{SYSTEM_NAMESPACE_PREFIX}{system}"),
        }
    }
}

/// The lookup contract consumed by the compiler and the evaluator.
pub trait MacroTable {
    fn get(&self, reference: &MacroRef) -> Option<Rc<Macro>>;
}

/// User macros by address and name, backed by the system catalogue.
#[derive(Debug, Clone)]
pub struct MutableMacroTable {
    macros: Vec<Rc<Macro>>,
    by_name: HashMap<String, usize>,
    system: Vec<Rc<Macro>>,
}

impl Default for MutableMacroTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MutableMacroTable {
    pub fn new() -> Self {
        Self {
            macros: Vec::new(),
            by_name: HashMap::new(),
            system: ALL_SYSTEM_MACROS
                .iter()
                .map(|m| Rc::new(Macro::System(*m)))
                .collect(),
        }
    }

    /// Appends a compiled macro and returns its address.
    pub fn add(&mut self, template: TemplateMacro) -> IonResult<usize> {
        let address = self.macros.len();
        if let Some(name) = &template.name {
            if self.by_name.contains_key(name) {
                return Err(err_help!(
                    Signature,
                    format!("macro '{name}' is already defined"),
                    "each macro in a table needs a unique name"
                ));
            }
            self.by_name.insert(name.clone(), address);
        }
        trace!(address, name = ?template.name, "added macro to table");
        self.macros.push(Rc::new(Macro::Template(template)));
        Ok(address)
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    /// User macros in address order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Rc<Macro>)> {
        self.macros.iter().enumerate()
    }

    pub fn address_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn system(&self, system: SystemMacro) -> Rc<Macro> {
        Rc::clone(&self.system[system.address()])
    }
}

impl MacroTable for MutableMacroTable {
    fn get(&self, reference: &MacroRef) -> Option<Rc<Macro>> {
        match reference {
            MacroRef::Address(address) => self.macros.get(*address).cloned(),
            MacroRef::System(system) => Some(self.system(*system)),
            MacroRef::Name(name) => {
                if name.starts_with(SYSTEM_NAMESPACE_PREFIX) {
                    return SystemMacro::from_name(name).map(|m| self.system(m));
                }
                match self.by_name.get(name) {
                    Some(address) => self.macros.get(*address).cloned(),
                    None => SystemMacro::from_name(name).map(|m| self.system(m)),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::macros::TapeBuilder;
    use crate::model::Value;

    fn constant(name: &str) -> TemplateMacro {
        TemplateMacro {
            name: Some(name.to_string()),
            signature: vec![],
            body: TapeBuilder::new().value(Value::int(1)).build(),
        }
    }

    #[test]
    fn user_macros_shadow_system_names() {
        let mut table = MutableMacroTable::new();
        let address = table.add(constant("values")).unwrap();
        assert_eq!(address, 0);
        let found = table.get(&MacroRef::name("values")).unwrap();
        assert!(found.as_system().is_none());
        let system = table.get(&MacroRef::name("$ion::values")).unwrap();
        assert_eq!(system.as_system(), Some(SystemMacro::Values));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut table = MutableMacroTable::new();
        table.add(constant("m")).unwrap();
        assert!(table.add(constant("m")).is_err());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn addresses_resolve_user_macros_only() {
        let mut table = MutableMacroTable::new();
        table.add(constant("m")).unwrap();
        assert!(table.get(&MacroRef::Address(0)).is_some());
        assert!(table.get(&MacroRef::Address(1)).is_none());
        assert!(table.get(&MacroRef::System(SystemMacro::Sum)).is_some());
    }
}
