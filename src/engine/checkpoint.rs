//! チェックポイント保存
//!
//! # 責務
//!
//! - 各ステップ適用後の状態を永続化する [`CheckpointStore`] トレイト
//! - セッションIDをキーにしたJSONファイル実装 [`JsonCheckpointStore`]
//!
//! チェックポイントは観測と再開のための補助であり、保存の失敗は
//! エンジンの実行を止めません（エンジン側で警告ログのみ）。

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use uuid::Uuid;

use crate::error::EngineError;
use crate::state::WorkflowState;

/// 状態の保存・読み込みインターフェース
pub trait CheckpointStore: Send + Sync {
    /// 状態を保存する
    ///
    /// 同じセッションIDに対する保存は上書きです。
    fn save(&self, state: &WorkflowState) -> Result<(), EngineError>;

    /// セッションIDで状態を読み込む
    ///
    /// 保存されていない場合は `Ok(None)` を返します。
    fn load(&self, session_id: &Uuid) -> Result<Option<WorkflowState>, EngineError>;
}

/// `<dir>/<session_id>.json` に保存するファイル実装
pub struct JsonCheckpointStore {
    dir: PathBuf,
}

impl JsonCheckpointStore {
    /// 保存先ディレクトリを指定して生成
    ///
    /// ディレクトリが存在しない場合は作成します。
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| EngineError::Checkpoint(format!("ディレクトリ作成に失敗: {}", e)))?;
        Ok(Self { dir })
    }

    fn path_for(&self, session_id: &Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", session_id))
    }
}

impl CheckpointStore for JsonCheckpointStore {
    fn save(&self, state: &WorkflowState) -> Result<(), EngineError> {
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| EngineError::Checkpoint(format!("シリアライズに失敗: {}", e)))?;
        fs::write(self.path_for(&state.session_id), json)
            .map_err(|e| EngineError::Checkpoint(format!("書き込みに失敗: {}", e)))
    }

    fn load(&self, session_id: &Uuid) -> Result<Option<WorkflowState>, EngineError> {
        let raw = match fs::read_to_string(self.path_for(session_id)) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(EngineError::Checkpoint(format!("読み込みに失敗: {}", e)));
            }
        };

        let state = serde_json::from_str(&raw)
            .map_err(|e| EngineError::Checkpoint(format!("デシリアライズに失敗: {}", e)))?;
        Ok(Some(state))
    }
}
