//! Two small reference apps used to exercise Scenario S1 end to end and to
//! give `--list-apps`/`--shell` something real to point at. Not part of the
//! RPC fabric itself — just registrations a real deployment would replace
//! with its own apps.

mod first;
mod second;

use std::sync::Arc;

use crate::app_registry::AppRegistry;

pub fn register(apps: &AppRegistry) {
    apps.register("demos::First", Arc::new(first::build));
    apps.register("demos::Second", Arc::new(second::build));
}

pub fn register_mocks(mocks: &dirt_host::MockRegistry) {
    mocks.register("demos::FirstMock", Arc::new(first::build_mock));
}
