use crate::client::output::outputs::Output;
use crate::common::config::ControllerConfig;

pub struct GlobalSettings {
    config: ControllerConfig,
    printer: Box<dyn Output>,
}

impl GlobalSettings {
    pub fn new(config: ControllerConfig, printer: Box<dyn Output>) -> Self {
        GlobalSettings { config, printer }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn printer(&self) -> &dyn Output {
        self.printer.as_ref()
    }
}
