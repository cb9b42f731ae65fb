// DuckDB数据库模块
//
// 通过Actor模式保证DuckDB的单连接访问，对外提供异步、类型安全的API。
//
// 主要组件：
// - DuckDbManager: 高级API接口，供 Database 适配器使用
// - DuckDbActor: 内部Actor，执行实际的SQL
// - 数据模型和消息定义

mod actor;
mod manager;
mod messages;
mod models;

// 公开核心接口
pub use manager::DuckDbManager;
pub use models::{
    AppInstall, BackupAccount, BackupRecord, CronjobRow, DatabaseInstance, JobRecordRow,
    RecordFilter, SnapshotEntry, Website,
};
