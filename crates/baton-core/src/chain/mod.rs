//! Chain - トランザクショナルなタスクチェーン
//!
//! - **builder**: 型付きの組み立て（入出力の型チェックはコンパイル時）
//! - **executor**: 状態機械（Advancing / Unwinding / Finished）とサスペンド
//! - **completion**: 結果を起動元に届ける一回限りのシグナル

mod builder;
mod completion;
mod executor;

pub use self::builder::ChainBuilder;
pub use self::completion::CompletionHandle;
pub use self::executor::SuspendedChain;
