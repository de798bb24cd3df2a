// Copyright 2025 fliteral Authors
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

//! # fliteral CLI
//!
//! Command-line interface for the fliteral local function runner.
//!
//! ## Key Commands
//!
//! - `fliteral serve`: serve a function root over HTTP
//! - `fliteral invoke`: run one request through the pipeline and print the
//!   response as JSON (no socket involved)
//!
//! ## Configuration
//!
//! Every setting is taken from a command-line flag first, then from the
//! environment, then from a built-in default. See [`settings`].

pub mod invoke;
pub mod settings;
