//! 路径解析：把请求中不可信的路径片段转换为访问路径与展示路径。
//!
//! 解析结果不限制在任何根目录之内，含 `..` 的路径可以到达进程有权限访问的任意位置。

use std::env;
use std::path::{Component, Path, PathBuf};

/// 代表当前用户主目录的路径片段。
pub const HOME_TOKEN: &str = "~";

#[derive(Clone, Debug, Default)]
pub struct PathResolver {
    home: Option<PathBuf>,
}

impl PathResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// 使用固定的主目录替换 `~`，不再查询当前用户。
    #[cfg(test)]
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self {
            home: Some(home.into()),
        }
    }

    /// 返回所有文件系统调用使用的规范化绝对路径。
    pub fn resolve_for_access(&self, token: &str) -> PathBuf {
        let display = self.resolve_for_display(token);
        let path = Path::new(&display);
        if path.is_absolute() {
            normalize(path)
        } else {
            match env::current_dir() {
                Ok(cwd) => normalize(&cwd.join(path)),
                Err(_) => normalize(path),
            }
        }
    }

    /// 返回回显给客户端的路径：替换主目录并补齐根分隔符，但不做规范化。
    pub fn resolve_for_display(&self, token: &str) -> String {
        let path = self.substitute_home(token);
        if cfg!(windows) {
            path.replace('/', "\\")
        } else if path.starts_with('/') {
            path
        } else {
            format!("/{path}")
        }
    }

    fn substitute_home(&self, token: &str) -> String {
        if token != HOME_TOKEN {
            return token.to_string();
        }
        if let Some(home) = &self.home {
            return home.to_string_lossy().into_owned();
        }
        dirs::home_dir()
            .map(|home| home.to_string_lossy().into_owned())
            .or_else(|| env::var("HOME").ok())
            .unwrap_or_default()
    }
}

/// 词法规范化：去掉 `.`、折叠 `..` 与重复分隔符，不解析符号链接。
pub fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => normalized.push(component.as_os_str()),
            Component::CurDir => continue,
            // 根目录的 `..` 仍停在根目录。
            Component::ParentDir => {
                normalized.pop();
            }
            Component::Normal(segment) => normalized.push(segment),
        }
    }
    if normalized.as_os_str().is_empty() {
        normalized.push(Component::CurDir.as_os_str());
    }
    normalized
}

/// 上一级目录；根目录的上一级仍是它自己。
pub fn parent_or_self(path: &Path) -> PathBuf {
    path.parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| path.to_path_buf())
}

/// 路径最后一段；根目录返回其自身的字符串形式。
pub fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}
