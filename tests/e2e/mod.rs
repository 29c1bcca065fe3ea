//! 端到端测试模块
//!
//! 测试完整的请求检查流程和场景

mod custom_fact;
mod probe_blocking;
mod rate_counting;
