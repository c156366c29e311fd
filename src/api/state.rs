use crate::execution::{ExecutionDriver, ExecutionRegistry};

#[derive(Clone)]
pub struct AppState {
    pub driver: ExecutionDriver,
}

impl AppState {
    pub fn new(driver: ExecutionDriver) -> Self {
        Self { driver }
    }

    pub fn registry(&self) -> &ExecutionRegistry {
        self.driver.registry()
    }
}
