// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod control;
pub mod error;
pub mod fetch;
pub mod model;
pub mod options;
pub mod params;
pub mod resolver;
pub mod selector;

pub use control::*;
pub use error::*;
pub use fetch::{Element, Node, QueryDocument, QueryParseError};
pub use model::*;
pub use options::*;
pub use params::*;
pub use resolver::*;
pub use selector::*;
