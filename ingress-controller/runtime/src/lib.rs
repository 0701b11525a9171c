#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use meshgate_ingress_core as core;
pub use meshgate_ingress_k8s_api as k8s;
pub use meshgate_ingress_k8s_index as index;

mod args;
pub mod controller;
pub mod distribution;
mod enqueue;
pub mod handlers;
mod metrics;
pub mod queue;
pub mod readiness;


pub use self::{
    args::Args,
    controller::{Controller, Error},
    distribution::{Debounce, Distribution, PushCounters, PushRequest, Pusher},
    enqueue::{Enqueue, RequestPush},
    handlers::{Handler, HandlerRegistry},
    metrics::{ControllerMetrics, Outcome, WatchMetrics},
    queue::{Backoff, WorkQueue},
    readiness::Readiness,
};
