//! Built-in operations and sources.

pub mod arithmetic;
pub mod logic;
pub mod value_source;

pub use arithmetic::BinaryOperation;
pub use logic::{SwitchOperation, ValveOperation};
pub use value_source::ValueSource;

use crate::error::Result;
use crate::pipeline::registry::OperationRegistry;

/// Register every built-in operation with `registry`.
pub fn register_builtin(registry: &OperationRegistry) -> Result<()> {
    for metadata in [
        arithmetic::add(),
        arithmetic::subtract(),
        arithmetic::multiply(),
        arithmetic::divide(),
        logic::switch(),
        logic::valve(),
    ] {
        registry.register(metadata)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::operation::Category;

    #[test]
    fn test_register_builtin() {
        let registry = OperationRegistry::new();
        register_builtin(&registry).unwrap();
        assert_eq!(registry.len(), 6);
        assert_eq!(registry.by_category(Category::Logical).len(), 2);
        assert!(register_builtin(&registry).is_err());
    }
}
