// SPDX-License-Identifier: GPL-3.0-only

//! Parameter gateway
//!
//! The host's declarative configuration boundary. The bridge declares its
//! settings here with descriptors (type, range, read-only flag), validates
//! externally submitted writes against them, and pushes authoritative value
//! updates back when hardware state changes underneath. Consumers such as a
//! control panel observe value changes through the update topic.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{PARAM_AUTO_EXPOSURE_PREFIX, PARAM_EXPOSURE_TIME_PREFIX};
use crate::errors::ParameterError;
use crate::pubsub::{Subscriber, Topic};

/// A parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Str(String),
    StrList(Vec<String>),
}

impl ParamValue {
    /// True when both values carry the same variant
    fn same_kind(&self, other: &ParamValue) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(v) => Some(v),
            _ => None,
        }
    }
}

/// Declaration metadata for one parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamDescriptor {
    pub name: String,
    pub description: String,
    pub read_only: bool,
    /// Valid inclusive range for integer parameters
    pub integer_range: Option<(i64, i64)>,
    /// Human-readable constraints that cannot be expressed as a range
    pub additional_constraints: String,
}

impl ParamDescriptor {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            read_only: false,
            integer_range: None,
            additional_constraints: String::new(),
        }
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn integer_range(mut self, min: i64, max: i64) -> Self {
        self.integer_range = Some((min, max));
        self
    }

    pub fn constraints(mut self, text: &str) -> Self {
        self.additional_constraints = text.to_string();
        self
    }
}

/// One externally submitted write
#[derive(Debug, Clone, PartialEq)]
pub struct ParamWrite {
    pub name: String,
    pub value: ParamValue,
}

impl ParamWrite {
    pub fn new(name: &str, value: ParamValue) -> Self {
        Self {
            name: name.to_string(),
            value,
        }
    }
}

/// Value change notification published to gateway observers
#[derive(Debug, Clone)]
pub struct ParamUpdate {
    pub name: String,
    pub value: ParamValue,
}

struct Declared {
    descriptor: ParamDescriptor,
    value: ParamValue,
}

/// In-process parameter store with validation and change notification
pub struct ParameterGateway {
    params: Mutex<HashMap<String, Declared>>,
    updates: Topic<ParamUpdate>,
}

impl Default for ParameterGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl ParameterGateway {
    pub fn new() -> Self {
        Self {
            params: Mutex::new(HashMap::new()),
            updates: Topic::new("parameter_updates"),
        }
    }

    /// Declare a parameter with an initial value. Redeclaring replaces the
    /// previous declaration.
    pub fn declare(&self, descriptor: ParamDescriptor, value: ParamValue) {
        let name = descriptor.name.clone();
        self.params
            .lock()
            .unwrap()
            .insert(name.clone(), Declared { descriptor, value });
        debug!(name = %name, "Parameter declared");
    }

    /// Remove a declaration, e.g. when a stream slot disappears after a
    /// use-case switch
    pub fn undeclare(&self, name: &str) {
        if self.params.lock().unwrap().remove(name).is_some() {
            debug!(name = %name, "Parameter undeclared");
        }
    }

    pub fn get(&self, name: &str) -> Option<ParamValue> {
        self.params
            .lock()
            .unwrap()
            .get(name)
            .map(|d| d.value.clone())
    }

    pub fn describe(&self, name: &str) -> Option<ParamDescriptor> {
        self.params
            .lock()
            .unwrap()
            .get(name)
            .map(|d| d.descriptor.clone())
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.params.lock().unwrap().contains_key(name)
    }

    /// Names of all declared parameters (unordered)
    pub fn names(&self) -> Vec<String> {
        self.params.lock().unwrap().keys().cloned().collect()
    }

    /// Authoritative value push from the core. Validates type and range but
    /// bypasses nothing else; read-only parameters reject writes here too.
    pub fn set(&self, name: &str, value: ParamValue) -> Result<(), ParameterError> {
        {
            let mut params = self.params.lock().unwrap();
            let declared = params
                .get_mut(name)
                .ok_or_else(|| ParameterError::Unknown(name.to_string()))?;
            if declared.descriptor.read_only {
                return Err(ParameterError::ReadOnly(name.to_string()));
            }
            validate_against(&declared.descriptor, &declared.value, &value)?;
            declared.value = value.clone();
        }
        self.updates.publish(&ParamUpdate {
            name: name.to_string(),
            value,
        });
        Ok(())
    }

    /// Replace the integer range of a declared parameter and reset its
    /// value to `default`. Used when a use-case switch changes the device's
    /// exposure limits.
    pub fn redeclare_integer_range(&self, name: &str, min: i64, max: i64, default: i64) {
        {
            let mut params = self.params.lock().unwrap();
            let Some(declared) = params.get_mut(name) else {
                return;
            };
            declared.descriptor.integer_range = Some((min, max));
            declared.value = ParamValue::Int(default);
        }
        self.updates.publish(&ParamUpdate {
            name: name.to_string(),
            value: ParamValue::Int(default),
        });
    }

    /// Validate one external write without applying it. Performed before
    /// any device call.
    pub fn check_write(&self, write: &ParamWrite) -> Result<(), ParameterError> {
        let params = self.params.lock().unwrap();
        let declared = params
            .get(&write.name)
            .ok_or_else(|| ParameterError::Unknown(write.name.clone()))?;
        if declared.descriptor.read_only {
            return Err(ParameterError::ReadOnly(write.name.clone()));
        }
        validate_against(&declared.descriptor, &declared.value, &write.value)
    }

    /// Observe value changes
    pub fn subscribe_updates(&self) -> Subscriber<ParamUpdate> {
        self.updates.subscribe()
    }
}

fn validate_against(
    descriptor: &ParamDescriptor,
    current: &ParamValue,
    new: &ParamValue,
) -> Result<(), ParameterError> {
    if !current.same_kind(new) {
        return Err(ParameterError::WrongType(descriptor.name.clone()));
    }
    if let (Some((min, max)), ParamValue::Int(v)) = (descriptor.integer_range, new) {
        if *v < min || *v > max {
            return Err(ParameterError::OutOfRange {
                name: descriptor.name.clone(),
                value: *v,
                min,
                max,
            });
        }
    }
    Ok(())
}

/// Stream index of an `exposure_time_<i>` parameter name
pub fn exposure_time_index(name: &str) -> Option<usize> {
    name.strip_prefix(PARAM_EXPOSURE_TIME_PREFIX)?.parse().ok()
}

/// Stream index of an `auto_exposure_<i>` parameter name
pub fn auto_exposure_index(name: &str) -> Option<usize> {
    name.strip_prefix(PARAM_AUTO_EXPOSURE_PREFIX)?.parse().ok()
}

/// Find a stream whose exposure time and auto-exposure mode are both
/// written in one batch. Such batches are ambiguous (the outcome would
/// depend on item order) and are rejected wholesale.
pub fn batch_conflict(batch: &[ParamWrite]) -> Option<usize> {
    for write in batch {
        if let Some(idx) = exposure_time_index(&write.name) {
            if batch
                .iter()
                .any(|other| auto_exposure_index(&other.name) == Some(idx))
            {
                return Some(idx);
            }
        }
    }
    None
}
