//! 会话持久化
//!
//! 将会话 transcript 写入/从 JSON 文件加载（{dir}/{session_id}.json）。
//! 这是循环之外的显式 save/load 边界：Loop Controller 从不直接读写磁盘。

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::{ConversationState, Message, Session};

#[derive(Serialize, Deserialize)]
struct SessionSnapshot {
    id: String,
    created_at: DateTime<Utc>,
    messages: Vec<Message>,
}

/// 按会话 id 存取的文件持久化
#[derive(Debug, Clone)]
pub struct ConversationPersistence {
    dir: PathBuf,
}

impl ConversationPersistence {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.json"))
    }

    /// 加载会话；文件不存在时返回 None，transcript 不满足配对不变量时报错
    pub fn load(&self, session_id: &str) -> anyhow::Result<Option<Session>> {
        let path = self.path_for(session_id);
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&path)
            .with_context(|| format!("read session file {}", path.display()))?;
        let snapshot: SessionSnapshot = serde_json::from_str(&data)
            .with_context(|| format!("parse session file {}", path.display()))?;
        let conversation = ConversationState::from_messages(snapshot.messages)
            .with_context(|| format!("invalid transcript in {}", path.display()))?;
        Ok(Some(Session::restore(
            snapshot.id,
            snapshot.created_at,
            conversation,
        )))
    }

    /// 写入会话；目录不存在时自动创建
    pub fn save(&self, session: &Session) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("create session dir {}", self.dir.display()))?;
        let snapshot = SessionSnapshot {
            id: session.id().to_string(),
            created_at: session.created_at(),
            messages: session.messages().to_vec(),
        };
        let path = self.path_for(session.id());
        std::fs::write(&path, serde_json::to_string_pretty(&snapshot)?)
            .with_context(|| format!("write session file {}", path.display()))?;
        tracing::debug!(path = %path.display(), messages = snapshot.messages.len(), "session saved");
        Ok(())
    }
}
