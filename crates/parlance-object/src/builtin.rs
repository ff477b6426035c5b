//! Built-in value classes: `Int`, `Float`, and `String`.
//!
//! Registered at runtime initialization, these wrap plain values in the
//! object model so heterogeneous containers and plugin interfaces can pass
//! them around as [`Object`]s. Each carries a full compare/print/copy
//! table.
//!
//! Instance layouts are fixed-size like every class: `Int` and `Float`
//! store their value in the first 8 bytes; `String` stores a 2-byte length
//! prefix followed by up to [`STRING_CAPACITY`] bytes of UTF-8.

use crate::descriptor::ClassDescriptor;
use crate::error::{LifecycleError, ObjectError};
use crate::object::Object;
use crate::system::ObjectSystem;

/// Class name of the built-in integer wrapper.
pub const INT_CLASS: &str = "Int";

/// Class name of the built-in float wrapper.
pub const FLOAT_CLASS: &str = "Float";

/// Class name of the built-in string wrapper.
pub const STRING_CLASS: &str = "String";

/// Maximum UTF-8 byte length of a `String` instance.
pub const STRING_CAPACITY: usize = 254;

const STRING_SIZE: usize = 2 + STRING_CAPACITY;

fn int_of(data: &[u8]) -> i64 {
    i64::from_ne_bytes(data[..8].try_into().expect("Int state is 8 bytes"))
}

fn float_of(data: &[u8]) -> f64 {
    f64::from_ne_bytes(data[..8].try_into().expect("Float state is 8 bytes"))
}

fn str_of(data: &[u8]) -> &str {
    let len = u16::from_ne_bytes(data[..2].try_into().expect("String state has a length prefix"))
        as usize;
    std::str::from_utf8(&data[2..2 + len]).unwrap_or("")
}

fn memberwise_copy(src: &[u8], dst: &mut [u8]) -> Result<(), LifecycleError> {
    dst.copy_from_slice(src);
    Ok(())
}

/// Register the built-in value classes.
pub fn register_builtin_classes(system: &ObjectSystem) -> Result<(), ObjectError> {
    system.registry().register(
        ClassDescriptor::new(INT_CLASS, 8)
            .with_compare(|a, b| int_of(a).cmp(&int_of(b)))
            .with_print(|data| int_of(data).to_string())
            .with_copy(memberwise_copy),
    )?;
    system.registry().register(
        ClassDescriptor::new(FLOAT_CLASS, 8)
            .with_compare(|a, b| float_of(a).total_cmp(&float_of(b)))
            .with_print(|data| float_of(data).to_string())
            .with_copy(memberwise_copy),
    )?;
    system.registry().register(
        ClassDescriptor::new(STRING_CLASS, STRING_SIZE)
            .with_compare(|a, b| str_of(a).cmp(str_of(b)))
            .with_print(|data| str_of(data).to_string())
            .with_copy(memberwise_copy),
    )?;
    Ok(())
}

/// Allocate an `Int` holding `value`.
pub fn new_int(system: &ObjectSystem, value: i64) -> Result<Object, ObjectError> {
    let object = system.allocate(INT_CLASS)?;
    set_int(&object, value);
    Ok(object)
}

/// Allocate a `Float` holding `value`.
pub fn new_float(system: &ObjectSystem, value: f64) -> Result<Object, ObjectError> {
    let object = system.allocate(FLOAT_CLASS)?;
    set_float(&object, value);
    Ok(object)
}

/// Allocate a `String` holding `value`.
///
/// Fails when `value` exceeds [`STRING_CAPACITY`] bytes.
pub fn new_string(system: &ObjectSystem, value: &str) -> Result<Object, ObjectError> {
    if value.len() > STRING_CAPACITY {
        return Err(ObjectError::Lifecycle {
            class: STRING_CLASS.to_string(),
            op: "init",
            source: LifecycleError(format!(
                "string of {} bytes exceeds the {STRING_CAPACITY}-byte capacity",
                value.len()
            )),
        });
    }
    let object = system.allocate(STRING_CLASS)?;
    set_string(&object, value);
    Ok(object)
}

/// The value of an `Int` object, or `None` for any other class.
pub fn int_value(object: &Object) -> Option<i64> {
    object
        .is_a(INT_CLASS)
        .then(|| object.with_data(int_of))
}

/// The value of a `Float` object, or `None` for any other class.
pub fn float_value(object: &Object) -> Option<f64> {
    object
        .is_a(FLOAT_CLASS)
        .then(|| object.with_data(float_of))
}

/// The value of a `String` object, or `None` for any other class.
pub fn string_value(object: &Object) -> Option<String> {
    object
        .is_a(STRING_CLASS)
        .then(|| object.with_data(|data| str_of(data).to_string()))
}

/// Store `value` into an `Int` object. Returns false for other classes.
pub fn set_int(object: &Object, value: i64) -> bool {
    object.is_a(INT_CLASS)
        && object.with_data_mut(|data| {
            data[..8].copy_from_slice(&value.to_ne_bytes());
            true
        })
}

/// Store `value` into a `Float` object. Returns false for other classes.
pub fn set_float(object: &Object, value: f64) -> bool {
    object.is_a(FLOAT_CLASS)
        && object.with_data_mut(|data| {
            data[..8].copy_from_slice(&value.to_ne_bytes());
            true
        })
}

/// Store `value` into a `String` object. Returns false for other classes
/// or when `value` exceeds [`STRING_CAPACITY`] bytes.
pub fn set_string(object: &Object, value: &str) -> bool {
    if !object.is_a(STRING_CLASS) || value.len() > STRING_CAPACITY {
        return false;
    }
    object.with_data_mut(|data| {
        data[..2].copy_from_slice(&(value.len() as u16).to_ne_bytes());
        data[2..2 + value.len()].copy_from_slice(value.as_bytes());
    });
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;

    fn system() -> ObjectSystem {
        let system = ObjectSystem::new();
        register_builtin_classes(&system).unwrap();
        system
    }

    #[test]
    fn int_round_trip_and_compare() {
        let system = system();
        let three = new_int(&system, 3).unwrap();
        let seven = new_int(&system, 7).unwrap();

        assert_eq!(int_value(&three), Some(3));
        assert_eq!(three.compare(&seven), Some(Ordering::Less));
        assert_eq!(three.print().as_deref(), Some("3"));
    }

    #[test]
    fn float_uses_total_ordering() {
        let system = system();
        let nan = new_float(&system, f64::NAN).unwrap();
        let one = new_float(&system, 1.0).unwrap();

        assert_eq!(nan.compare(&one), Some(Ordering::Greater));
        assert_eq!(float_value(&one), Some(1.0));
    }

    #[test]
    fn string_round_trip_and_capacity() {
        let system = system();
        let hello = new_string(&system, "hello").unwrap();
        assert_eq!(string_value(&hello).as_deref(), Some("hello"));
        assert_eq!(hello.print().as_deref(), Some("hello"));

        assert!(set_string(&hello, "rewritten"));
        assert_eq!(string_value(&hello).as_deref(), Some("rewritten"));

        let oversized = "x".repeat(STRING_CAPACITY + 1);
        assert!(!set_string(&hello, &oversized));
        assert!(new_string(&system, &oversized).is_err());
    }

    #[test]
    fn accessors_reject_wrong_classes() {
        let system = system();
        let int = new_int(&system, 1).unwrap();
        assert_eq!(float_value(&int), None);
        assert_eq!(string_value(&int), None);
        assert!(!set_float(&int, 2.0));
    }

    #[test]
    fn copy_preserves_value() {
        let system = system();
        let original = new_string(&system, "copied").unwrap();
        let copy = system.copy(&original).unwrap().unwrap();
        assert_eq!(string_value(&copy).as_deref(), Some("copied"));
        assert!(!copy.same_instance(&original));
    }

    #[test]
    fn builtins_are_objects() {
        let system = system();
        let int = new_int(&system, 5).unwrap();
        assert!(int.is_a(crate::registry::ROOT_CLASS));
        assert_eq!(int.type_name(), INT_CLASS);
    }
}
