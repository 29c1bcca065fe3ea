//! matchers 集成测试

mod integration;
