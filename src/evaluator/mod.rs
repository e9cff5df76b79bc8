// Copyright 2024 OctoFHIR Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Rule expression evaluation
//!
//! The interpreter runs rule conditions and actions against a
//! [`Session`](crate::session::Session). Besides member access and operators
//! it dispatches method calls on values and the functions of the injected
//! namespaces (`data`, `fhirPath`, `service`, `dates`, `StringUtils`, `Math`).

pub mod dates;
pub mod error;
pub mod operations;

mod arguments;
mod interpreter;
mod methods;
mod namespaces;
mod service;

pub use dates::{DEFAULT_DATE_FORMAT, DateService, convert_date_pattern};
pub use error::{EvaluationError, EvaluationResult};
pub use interpreter::evaluate;
