pub mod dispatcher;
pub mod method_call;
