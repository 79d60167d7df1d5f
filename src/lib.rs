//! kasetsu-flow: ロールパイプライン型の仮説生成ワークフローエンジン
//!
//! 共有状態 [`state::WorkflowState`] を、ロール特化ステップ
//! （research → analyze → generate → critique）の順序付きパイプラインに
//! 通すエンジンです。各ステップは統一されたツール起動レイヤーを通じて
//! 外部能力（文献検索・検証ヒューリスティック・LLM生成）を利用し、
//! 決定的なルーターが次のステップを選びます。
//!
//! # 設計の要点
//!
//! - **単一の変更経路**: ステップは状態のスナップショットを受け取り
//!   差分を返すだけ。正準状態への適用はエンジンが一元的に行う
//! - **障害の隔離**: ステップのパニック・タイムアウトは終端状態
//!   `Failed` として記録され、プロセスとエンジンは使い続けられる
//! - **決定的ルーティング**: 遷移は順序付き規則表のみで決まり、
//!   外部呼び出しや乱数に依存しない
//! - **宣言的構成**: パイプラインは TOML で定義し、読み込み時に
//!   参照整合性とデッドロックを検証する
//!
//! # モジュール構成
//!
//! - [`state`] - ワークフロー状態と差分
//! - [`tool`] - ツール起動レイヤーと組み込みツール
//! - [`step`] - ロール別ステップ実装
//! - [`router`] - 決定的ルーター
//! - [`engine`] - 実行エンジンとチェックポイント
//! - [`runner`] - 同期／バックグラウンドの起動面
//! - [`config`] - パイプライン定義の読み込みと検証
//! - [`error`] - エラー型

pub mod config;
pub mod engine;
pub mod error;
pub mod router;
pub mod runner;
pub mod state;
pub mod step;
pub mod tool;
