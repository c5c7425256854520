//! Ports - 抽象化レイヤー
//!
//! チェーンのエンジンは具体的なスレッド管理を知りません。
//! ExecutionContext trait だけを通してコンテキストを移動します。

pub mod context;

pub use self::context::ExecutionContext;
