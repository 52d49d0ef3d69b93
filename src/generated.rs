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

//! Protobuf messages for the subset of the Envoy v3 API that listener
//! discovery consumes. Field tags follow upstream Envoy.

#![allow(
    clippy::doc_markdown,
    clippy::use_self,
    clippy::enum_variant_names,
    clippy::large_enum_variant
)]

pub mod envoy {
    pub mod config {
        pub mod core {
            pub mod v3;
        }
        pub mod listener {
            pub mod v3;
        }
    }
    pub mod service {
        pub mod discovery {
            pub mod v3;
        }
    }
}

pub mod google {
    pub mod rpc;
}
