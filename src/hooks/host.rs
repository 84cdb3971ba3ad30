//! Host object model that installers intercept.
//!
//! A [`Realm`] is a set of named objects (`"navigator"`,
//! `"CanvasRenderingContext2D.prototype"`, ...) holding properties. A
//! property is a method, an accessor or a plain value, each carrying the
//! `configurable` / `enumerable` bits that decide whether it may be
//! redefined and whether the page can see it in key listings.
//!
//! Interception follows one contract everywhere:
//! capture the original, install a replacement, keep the returned
//! [`PatchHandle`] so the original can be restored.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::error::{Result, ShufflerError};

/// Values crossing the host boundary.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    /// Clamped byte buffer (pixel data).
    Bytes(Vec<u8>),
    /// 32-bit float buffer (audio samples).
    Floats(Vec<f32>),
    List(Vec<Value>),
    Record(BTreeMap<String, Value>),
}

impl Value {
    pub fn record<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Record(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Record(map) => Some(map),
            _ => None,
        }
    }

    /// Field of a record; `Undefined` for anything else.
    pub fn get(&self, key: &str) -> &Value {
        const UNDEFINED: Value = Value::Undefined;
        match self {
            Value::Record(map) => map.get(key).unwrap_or(&UNDEFINED),
            _ => &UNDEFINED,
        }
    }

    /// Mutable field of a record.
    pub fn field_mut(&mut self, key: &str) -> Option<&mut Value> {
        match self {
            Value::Record(map) => map.get_mut(key),
            _ => None,
        }
    }

    /// Set a field. No-op unless this is a record.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        if let Value::Record(map) = self {
            map.insert(key.to_string(), value.into());
        }
    }

    /// Truthiness as a page script would see it.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

/// Host-callable function: `(this, args) -> value`. `Err` is a thrown
/// exception.
pub type NativeFn = Rc<dyn Fn(&Value, &[Value]) -> Result<Value>>;

pub fn native<F>(f: F) -> NativeFn
where
    F: Fn(&Value, &[Value]) -> Result<Value> + 'static,
{
    Rc::new(f)
}

#[derive(Clone)]
pub enum Slot {
    Method(NativeFn),
    Accessor(NativeFn),
    Data(Value),
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Method(_) => f.write_str("Method(..)"),
            Slot::Accessor(_) => f.write_str("Accessor(..)"),
            Slot::Data(v) => f.debug_tuple("Data").field(v).finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Property {
    pub slot: Slot,
    pub configurable: bool,
    pub enumerable: bool,
}

impl Property {
    pub fn method(f: NativeFn) -> Self {
        Self {
            slot: Slot::Method(f),
            configurable: true,
            enumerable: false,
        }
    }

    pub fn data(value: Value) -> Self {
        Self {
            slot: Slot::Data(value),
            configurable: true,
            enumerable: true,
        }
    }

    pub fn getter(f: NativeFn) -> Self {
        Self {
            slot: Slot::Accessor(f),
            configurable: true,
            enumerable: true,
        }
    }

    pub fn locked(mut self) -> Self {
        self.configurable = false;
        self
    }
}

type Object = BTreeMap<String, Property>;

/// The host objects of one browsing context.
#[derive(Default)]
pub struct Realm {
    objects: RefCell<BTreeMap<String, Object>>,
}

impl fmt::Debug for Realm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(self.objects.borrow().keys())
            .finish()
    }
}

impl Realm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `object` if it does not exist.
    pub fn define_object(&self, object: &str) -> &Self {
        self.objects
            .borrow_mut()
            .entry(object.to_string())
            .or_default();
        self
    }

    pub fn has_object(&self, object: &str) -> bool {
        self.objects.borrow().contains_key(object)
    }

    pub fn has_property(&self, object: &str, name: &str) -> bool {
        self.objects
            .borrow()
            .get(object)
            .is_some_and(|o| o.contains_key(name))
    }

    /// Define (or overwrite) a property unconditionally. Host setup only.
    pub fn define_property(&self, object: &str, name: &str, property: Property) -> &Self {
        self.objects
            .borrow_mut()
            .entry(object.to_string())
            .or_default()
            .insert(name.to_string(), property);
        self
    }

    pub fn set_method<F>(&self, object: &str, name: &str, f: F) -> &Self
    where
        F: Fn(&Value, &[Value]) -> Result<Value> + 'static,
    {
        self.define_property(object, name, Property::method(native(f)))
    }

    pub fn set_value(&self, object: &str, name: &str, value: impl Into<Value>) -> &Self {
        self.define_property(object, name, Property::data(value.into()))
    }

    pub fn property(&self, object: &str, name: &str) -> Option<Property> {
        self.objects.borrow().get(object)?.get(name).cloned()
    }

    /// Enumerable keys of `object`, in key order.
    pub fn own_keys(&self, object: &str) -> Vec<String> {
        self.objects
            .borrow()
            .get(object)
            .map(|o| {
                o.iter()
                    .filter(|(_, p)| p.enumerable)
                    .map(|(k, _)| k.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Read a property the way a page would: data is returned, accessors
    /// are invoked, missing properties are `Undefined`.
    pub fn get(&self, object: &str, name: &str) -> Result<Value> {
        if !self.has_object(object) {
            return Err(ShufflerError::missing(object, name));
        }
        match self.property(object, name).map(|p| p.slot) {
            Some(Slot::Data(v)) => Ok(v),
            Some(Slot::Accessor(getter)) => getter(&Value::Undefined, &[]),
            Some(Slot::Method(_)) | None => Ok(Value::Undefined),
        }
    }

    /// Invoke a method with `this` and `args`.
    pub fn call(&self, object: &str, name: &str, this: &Value, args: &[Value]) -> Result<Value> {
        match self.property(object, name).map(|p| p.slot) {
            Some(Slot::Method(f)) => f(this, args),
            _ => Err(ShufflerError::missing(object, name)),
        }
    }

    /// Current method at `object.name`, if any.
    pub fn capture(&self, object: &str, name: &str) -> Option<Captured> {
        match self.property(object, name)?.slot {
            Slot::Method(original) => Some(Captured {
                object: object.to_string(),
                name: name.to_string(),
                original,
            }),
            _ => None,
        }
    }

    /// Current getter at `object.name`, if it is an accessor.
    pub fn getter(&self, object: &str, name: &str) -> Option<NativeFn> {
        match self.property(object, name)?.slot {
            Slot::Accessor(getter) => Some(getter),
            _ => None,
        }
    }

    /// Swap the method at `object.name` for `replacement`.
    ///
    /// The property keeps its flags. Fails if it is missing or locked.
    pub fn replace_method(
        &self,
        object: &str,
        name: &str,
        replacement: NativeFn,
    ) -> Result<PatchHandle> {
        let mut objects = self.objects.borrow_mut();
        let target = objects
            .get_mut(object)
            .and_then(|o| o.get_mut(name))
            .ok_or_else(|| ShufflerError::missing(object, name))?;
        if !target.configurable {
            return Err(ShufflerError::non_configurable(object, name));
        }
        let previous = target.clone();
        target.slot = Slot::Method(replacement);
        Ok(PatchHandle {
            object: object.to_string(),
            name: name.to_string(),
            previous: Some(previous),
        })
    }

    /// Define an accessor at `object.name`.
    ///
    /// The existing descriptor is inspected first; a non-configurable
    /// property is left alone and reported as `NonConfigurable`.
    pub fn define_getter(
        &self,
        object: &str,
        name: &str,
        getter: NativeFn,
        configurable: bool,
    ) -> Result<PatchHandle> {
        let mut objects = self.objects.borrow_mut();
        let target = objects
            .get_mut(object)
            .ok_or_else(|| ShufflerError::missing(object, name))?;
        let previous = target.get(name).cloned();
        if previous.as_ref().is_some_and(|p| !p.configurable) {
            return Err(ShufflerError::non_configurable(object, name));
        }
        target.insert(
            name.to_string(),
            Property {
                slot: Slot::Accessor(getter),
                configurable,
                enumerable: true,
            },
        );
        Ok(PatchHandle {
            object: object.to_string(),
            name: name.to_string(),
            previous,
        })
    }

    /// Put back whatever `handle` replaced.
    pub fn restore(&self, handle: PatchHandle) {
        let mut objects = self.objects.borrow_mut();
        let Some(target) = objects.get_mut(&handle.object) else {
            return;
        };
        match handle.previous {
            Some(previous) => {
                target.insert(handle.name, previous);
            }
            None => {
                target.remove(&handle.name);
            }
        }
    }
}

/// A method captured before interception.
pub struct Captured {
    object: String,
    name: String,
    original: NativeFn,
}

impl Captured {
    pub fn object(&self) -> &str {
        &self.object
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn original(&self) -> &NativeFn {
        &self.original
    }

    /// Install `replacement` where the original was captured.
    pub fn install(&self, realm: &Realm, replacement: NativeFn) -> Result<PatchHandle> {
        realm.replace_method(&self.object, &self.name, replacement)
    }
}

/// Undo record for one interception.
#[derive(Debug)]
pub struct PatchHandle {
    object: String,
    name: String,
    previous: Option<Property>,
}

impl PatchHandle {
    pub fn target(&self) -> String {
        format!("{}.{}", self.object, self.name)
    }
}

/// Patches applied by one installer.
#[derive(Debug, Default)]
pub struct PatchSet {
    handles: Vec<PatchHandle>,
}

impl PatchSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, handle: PatchHandle) {
        self.handles.push(handle);
    }

    pub fn extend(&mut self, other: PatchSet) {
        self.handles.extend(other.handles);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// `object.name` of every patched property, in install order.
    pub fn targets(&self) -> Vec<String> {
        self.handles.iter().map(PatchHandle::target).collect()
    }

    /// Undo every patch, most recent first.
    pub fn restore(self, realm: &Realm) {
        for handle in self.handles.into_iter().rev() {
            realm.restore(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn realm() -> Realm {
        let realm = Realm::new();
        realm
            .set_method("Math", "twice", |_, args| {
                Ok(Value::from(args[0].as_f64().unwrap_or(0.0) * 2.0))
            })
            .set_value("screen", "width", 1920u32)
            .define_property("navigator", "platform", Property::data("Linux".into()).locked());
        realm
    }

    #[test]
    fn test_call_and_get() {
        let realm = realm();
        let out = realm
            .call("Math", "twice", &Value::Undefined, &[Value::from(21.0)])
            .unwrap();
        assert_eq!(out, Value::Number(42.0));
        assert_eq!(realm.get("screen", "width").unwrap(), Value::Number(1920.0));
        assert_eq!(realm.get("screen", "nothing").unwrap(), Value::Undefined);
        assert!(realm.get("nowhere", "width").is_err());
        assert!(realm.call("Math", "missing", &Value::Undefined, &[]).is_err());
    }

    #[test]
    fn test_capture_install_restore() {
        let realm = realm();
        let captured = realm.capture("Math", "twice").unwrap();
        let original = captured.original().clone();
        let handle = captured
            .install(
                &realm,
                native(move |this, args| {
                    let base = original(this, args)?.as_f64().unwrap_or(0.0);
                    Ok(Value::from(base + 1.0))
                }),
            )
            .unwrap();

        let patched = realm
            .call("Math", "twice", &Value::Undefined, &[Value::from(2.0)])
            .unwrap();
        assert_eq!(patched, Value::Number(5.0));

        realm.restore(handle);
        let restored = realm
            .call("Math", "twice", &Value::Undefined, &[Value::from(2.0)])
            .unwrap();
        assert_eq!(restored, Value::Number(4.0));
    }

    #[test]
    fn test_define_getter_checks_descriptor() {
        let realm = realm();
        let err = realm
            .define_getter("navigator", "platform", native(|_, _| Ok("x".into())), true)
            .unwrap_err();
        assert!(matches!(err, ShufflerError::NonConfigurable { .. }));
        assert_eq!(realm.get("navigator", "platform").unwrap(), Value::from("Linux"));

        let handle = realm
            .define_getter("screen", "width", native(|_, _| Ok(Value::from(1366u32))), true)
            .unwrap();
        assert_eq!(realm.get("screen", "width").unwrap(), Value::Number(1366.0));
        realm.restore(handle);
        assert_eq!(realm.get("screen", "width").unwrap(), Value::Number(1920.0));
    }

    #[test]
    fn test_new_getter_restores_to_absent() {
        let realm = realm();
        let handle = realm
            .define_getter("screen", "orientation", native(|_, _| Ok("landscape".into())), true)
            .unwrap();
        assert!(realm.has_property("screen", "orientation"));
        realm.restore(handle);
        assert!(!realm.has_property("screen", "orientation"));
    }

    #[test]
    fn test_locked_method_cannot_be_replaced() {
        let realm = realm();
        realm.define_property(
            "Date.prototype",
            "now",
            Property::method(native(|_, _| Ok(Value::from(0.0)))).locked(),
        );
        let captured = realm.capture("Date.prototype", "now").unwrap();
        let err = captured
            .install(&realm, native(|_, _| Ok(Value::Null)))
            .unwrap_err();
        assert!(err.is_skip());
    }

    #[test]
    fn test_patch_set_restores_in_reverse() {
        let realm = realm();
        let mut set = PatchSet::new();
        set.push(
            realm
                .define_getter("screen", "width", native(|_, _| Ok(Value::from(1u32))), true)
                .unwrap(),
        );
        set.push(
            realm
                .define_getter("screen", "width", native(|_, _| Ok(Value::from(2u32))), true)
                .unwrap(),
        );
        assert_eq!(set.targets(), vec!["screen.width", "screen.width"]);
        set.restore(&realm);
        assert_eq!(realm.get("screen", "width").unwrap(), Value::Number(1920.0));
    }

    #[test]
    fn test_value_helpers() {
        let record = Value::record([("a", Value::from(1u32)), ("b", Value::from("x"))]);
        assert_eq!(record.get("a").as_f64(), Some(1.0));
        assert_eq!(record.get("b").as_str(), Some("x"));
        assert!(record.get("c").is_nullish());
        assert!(!Value::from("").truthy());
        assert!(Value::List(vec![]).truthy());
        assert!(!Value::Number(f64::NAN).truthy());
    }

    #[test]
    fn test_own_keys_lists_enumerable_only() {
        let realm = realm();
        assert!(realm.own_keys("Math").is_empty());
        assert_eq!(realm.own_keys("screen"), vec!["width"]);
    }
}
