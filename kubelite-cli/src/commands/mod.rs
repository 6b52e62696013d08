pub mod cache;
pub mod delete;
pub mod docker_env;
pub mod logs;
pub mod ssh;
pub mod start;
pub mod status;
pub mod stop;
