/*
 * Copyright 2020 Google LLC All Rights Reserved.
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

use once_cell::sync::{Lazy, OnceCell};
use prometheus::{IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry};

pub(crate) const LISTENER_LABEL: &str = "listener";
pub(crate) const TYPE_LABEL: &str = "type";
pub(crate) const REASON_LABEL: &str = "reason";

static REGISTRY: OnceCell<&'static Registry> = OnceCell::new();
static DEFAULT_REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

/// Sets the [`Registry`] all metrics are registered into. Only the first
/// call has an effect, and it must happen before any metric is used.
pub fn set_registry(registry: &'static Registry) {
    if REGISTRY.set(registry).is_err() {
        tracing::warn!("metrics registry was already set");
    }
}

/// Returns the [`Registry`] containing all the metrics of this crate.
#[inline]
pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(|| &*DEFAULT_REGISTRY)
}

pub fn opts(name: &str, subsystem: &str, description: &str) -> Opts {
    Opts::new(name, description)
        .namespace("lds")
        .subsystem(subsystem)
}

pub(crate) fn acks(type_url: &str) -> IntCounter {
    static ACKS: Lazy<IntCounterVec> = Lazy::new(|| {
        prometheus::register_int_counter_vec_with_registry! {
            opts("acks", "xds", "Total number of discovery responses acknowledged"),
            &[TYPE_LABEL],
            registry(),
        }
        .unwrap()
    });

    ACKS.with_label_values(&[type_url])
}

pub(crate) fn nacks(type_url: &str) -> IntCounter {
    static NACKS: Lazy<IntCounterVec> = Lazy::new(|| {
        prometheus::register_int_counter_vec_with_registry! {
            opts("nacks", "xds", "Total number of discovery responses with rejected resources"),
            &[TYPE_LABEL],
            registry(),
        }
        .unwrap()
    });

    NACKS.with_label_values(&[type_url])
}

pub(crate) fn rejected_resources(reason: &str) -> IntCounter {
    static REJECTED: Lazy<IntCounterVec> = Lazy::new(|| {
        prometheus::register_int_counter_vec_with_registry! {
            opts("rejected_resources", "xds", "Total number of listener resources rejected"),
            &[REASON_LABEL],
            registry(),
        }
        .unwrap()
    });

    REJECTED.with_label_values(&[reason])
}

pub(crate) fn discovery_responses(type_url: &str) -> IntCounter {
    static RESPONSES: Lazy<IntCounterVec> = Lazy::new(|| {
        prometheus::register_int_counter_vec_with_registry! {
            opts("discovery_responses", "xds", "Total number of discovery responses received"),
            &[TYPE_LABEL],
            registry(),
        }
        .unwrap()
    });

    RESPONSES.with_label_values(&[type_url])
}

pub(crate) fn active_sessions() -> &'static IntGauge {
    static SESSIONS: Lazy<IntGauge> = Lazy::new(|| {
        prometheus::register_int_gauge_with_registry! {
            opts("active_sessions", "xds", "Number of open discovery sessions"),
            registry(),
        }
        .unwrap()
    });

    &SESSIONS
}

pub(crate) fn active_listeners() -> &'static IntGauge {
    static ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
        prometheus::register_int_gauge_with_registry! {
            opts("active", "listeners", "Number of listeners accepting connections"),
            registry(),
        }
        .unwrap()
    });

    &ACTIVE
}

pub(crate) fn draining_listeners() -> &'static IntGauge {
    static DRAINING: Lazy<IntGauge> = Lazy::new(|| {
        prometheus::register_int_gauge_with_registry! {
            opts("draining", "listeners", "Number of retired listeners still draining"),
            registry(),
        }
        .unwrap()
    });

    &DRAINING
}

pub(crate) fn listener_updates(kind: &str) -> IntCounter {
    static UPDATES: Lazy<IntCounterVec> = Lazy::new(|| {
        prometheus::register_int_counter_vec_with_registry! {
            opts("updates", "listeners", "Total number of listener adds, modifications and removals"),
            &[TYPE_LABEL],
            registry(),
        }
        .unwrap()
    });

    UPDATES.with_label_values(&[kind])
}

pub(crate) fn bind_errors(listener: &str) -> IntCounter {
    static BIND_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
        prometheus::register_int_counter_vec_with_registry! {
            opts("bind_errors", "listeners", "Total number of failed listener socket creations"),
            &[LISTENER_LABEL],
            registry(),
        }
        .unwrap()
    });

    BIND_ERRORS.with_label_values(&[listener])
}

pub(crate) fn connections_accepted(listener: &str) -> IntCounter {
    static ACCEPTED: Lazy<IntCounterVec> = Lazy::new(|| {
        prometheus::register_int_counter_vec_with_registry! {
            opts("accepted_total", "connections", "Total number of connections accepted"),
            &[LISTENER_LABEL],
            registry(),
        }
        .unwrap()
    });

    ACCEPTED.with_label_values(&[listener])
}

pub(crate) fn active_connections(listener: &str) -> IntGauge {
    static ACTIVE: Lazy<IntGaugeVec> = Lazy::new(|| {
        prometheus::register_int_gauge_vec_with_registry! {
            opts("active", "connections", "Number of open connections per listener"),
            &[LISTENER_LABEL],
            registry(),
        }
        .unwrap()
    });

    ACTIVE.with_label_values(&[listener])
}

pub(crate) fn routing_failures(listener: &str, reason: &str) -> IntCounter {
    static FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
        prometheus::register_int_counter_vec_with_registry! {
            opts("routing_failures", "connections", "Total number of connections closed without a filter chain"),
            &[LISTENER_LABEL, REASON_LABEL],
            registry(),
        }
        .unwrap()
    });

    FAILURES.with_label_values(&[listener, reason])
}

pub(crate) fn ambiguous_matches(listener: &str) -> IntCounter {
    static AMBIGUOUS: Lazy<IntCounterVec> = Lazy::new(|| {
        prometheus::register_int_counter_vec_with_registry! {
            opts("ambiguous_matches", "connections", "Total number of connections routed by configuration order between equally specific filter chains"),
            &[LISTENER_LABEL],
            registry(),
        }
        .unwrap()
    });

    AMBIGUOUS.with_label_values(&[listener])
}

pub(crate) fn ambiguous_chains(listener: &str) -> IntCounter {
    static LINTS: Lazy<IntCounterVec> = Lazy::new(|| {
        prometheus::register_int_counter_vec_with_registry! {
            opts("ambiguous_chains", "listeners", "Total number of filter chain pairs configured with identical match criteria"),
            &[LISTENER_LABEL],
            registry(),
        }
        .unwrap()
    });

    LINTS.with_label_values(&[listener])
}

pub(crate) fn shutdown_initiated() -> &'static IntGauge {
    static SHUTDOWN_INITIATED: Lazy<IntGauge> = Lazy::new(|| {
        prometheus::register_int_gauge_with_registry! {
            opts("shutdown_initiated", "", "Shutdown process has been started"),
            registry(),
        }
        .unwrap()
    });

    &SHUTDOWN_INITIATED
}

/// Keeps the open session gauge in step with the lifetime of a session.
pub(crate) struct SessionMetricsGuard(());

impl SessionMetricsGuard {
    pub(crate) fn new() -> Self {
        active_sessions().inc();
        Self(())
    }
}

impl Drop for SessionMetricsGuard {
    fn drop(&mut self) {
        active_sessions().dec();
    }
}
