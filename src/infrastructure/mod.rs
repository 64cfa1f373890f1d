pub mod bluetooth;
pub mod dispatcher;
pub mod logging;
pub mod session;
pub mod simulator;
