//! Core value types and result codes for the tiered bytecode VM.
//!
//! This crate provides the foundational types shared by every component:
//! runtime values, declared types, host values, and the closed set of
//! execution result codes.
//!
//! # Overview
//!
//! - [`Value`] - Value held by a refcounted slot
//! - [`HeapId`] - Generation-checked identifier of a heap array
//! - [`ElementType`] / [`ValueType`] - Declared types
//! - [`HostValue`] - Owned value crossing the host boundary
//! - [`VmResult`] - Result code of an execution
//! - [`VmError`] - Interpreter fault carrying context
//!
//! # Examples
//!
//! ```
//! use core_types::{Value, VmError, VmResult};
//!
//! let value = Value::Int(42);
//! assert_eq!(value.type_name(), "int");
//!
//! let fault = VmError::DivisionByZero;
//! assert_eq!(fault.code(), VmResult::DivisionByZero);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod error;
mod value;

pub use error::{VmError, VmOutcome, VmResult};
pub use value::{ElementType, HeapId, HostValue, Value, ValueType};
