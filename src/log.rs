/*
 * Copyright 2020 Google LLC
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Installs the process wide `tracing` subscriber for hosts that do not
//! bring their own.

use tracing_subscriber::{filter::LevelFilter, EnvFilter};

/// Output format of the installed subscriber.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Format {
    #[default]
    Plain,
    Json,
}

/// Builds the filter from `directives`, falling back to `RUST_LOG` and then
/// to `INFO` when `directives` is `None`.
pub fn env_filter(directives: Option<&str>) -> crate::Result<EnvFilter> {
    let builder = EnvFilter::builder().with_default_directive(LevelFilter::INFO.into());

    Ok(match directives {
        Some(directives) => builder.parse(directives)?,
        None => builder.from_env_lossy(),
    })
}

/// Installs a global `fmt` subscriber. Fails if a subscriber is already set.
pub fn init(directives: Option<&str>, format: Format) -> crate::Result<()> {
    let filter = env_filter(directives)?;
    let builder = tracing_subscriber::fmt()
        .with_file(true)
        .with_env_filter(filter);

    match format {
        Format::Json => builder.json().try_init(),
        Format::Plain => builder.try_init(),
    }
    .map_err(|error| eyre::eyre!(error))
}
