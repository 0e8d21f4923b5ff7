pub mod dispatcher;
pub mod frame_task;
pub mod infrastructure;
pub mod pipeline_config;
pub mod pipeline_controller;
pub mod pipeline_error;
pub mod pipeline_logger;
pub mod stop_flag;
pub mod task_queue;
