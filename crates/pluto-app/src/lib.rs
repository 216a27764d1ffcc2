// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod console;
pub mod cycle;
pub mod history;
pub mod message;
pub mod nodes;
pub mod state;
pub mod summary;

pub use console::*;
pub use cycle::*;
pub use history::*;
pub use message::*;
pub use nodes::*;
pub use state::*;
pub use summary::*;
