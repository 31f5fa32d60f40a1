//! Unit and behaviour tests

mod common;

mod test_backup;
mod test_deploy;
mod test_escalator;
mod test_fsm;
mod test_notify;
