pub mod app;
pub mod push;
pub mod sdk;
pub mod sim;
pub mod ui;
pub mod worker;
