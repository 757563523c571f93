//! 基础设施层实现。
//!
//! 提供 redb 存储引擎、持久层、密钥哈希等适配器，实现应用/领域层定义的接口。

pub mod builder;
pub mod db;
pub mod password;
pub mod repository;
pub mod storage;

pub use builder::{Infrastructure, InfrastructureError};
pub use db::ChatDatabase;
pub use password::BcryptSecretVerifier;
pub use repository::RedbRepository;
pub use storage::{Partition, Store};
