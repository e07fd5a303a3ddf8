// Shader loading
//
// Shaders reach the renderer as immutable SPIR-V byte blobs looked up by
// logical name. A missing blob is fatal; there is no hot-reload.

use ash::util::read_spv;
use ash::vk;
use std::io::Cursor;
use std::path::PathBuf;

use super::VulkanDevice;
use crate::error::{RenderError, Result};

pub const VERTEX_SHADER: &str = "vertex";
pub const FRAGMENT_SHADER: &str = "fragment";

/// Source of shader bytecode by logical name.
pub trait ShaderSource {
    fn load(&self, name: &str) -> Result<Vec<u8>>;
}

/// Filesystem shader source mapping `name` to `<dir>/<name>.spv`.
pub struct DirShaderSource {
    root: PathBuf,
}

impl DirShaderSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ShaderSource for DirShaderSource {
    fn load(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.root.join(format!("{name}.spv"));
        std::fs::read(&path).map_err(|e| {
            log::debug!("Shader {:?} unreadable at {:?}: {}", name, path, e);
            RenderError::ShaderNotFound(name.to_string())
        })
    }
}

/// Create a shader module from a SPIR-V byte blob, realigning the bytes to
/// the 4-byte words Vulkan expects.
pub fn create_shader_module(
    device: &VulkanDevice,
    name: &str,
    code: &[u8],
) -> Result<vk::ShaderModule> {
    let words = read_spv(&mut Cursor::new(code)).map_err(|source| {
        RenderError::InvalidShaderBytecode {
            name: name.to_string(),
            source,
        }
    })?;

    let create_info = vk::ShaderModuleCreateInfo::builder().code(&words);

    unsafe { device.device.create_shader_module(&create_info, None) }.map_err(|result| {
        RenderError::ShaderModuleCreationFailed {
            name: name.to_string(),
            result,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_blob_is_shader_not_found() {
        let source = DirShaderSource::new("/nonexistent/shader/dir");
        let err = source.load(VERTEX_SHADER).unwrap_err();
        assert!(matches!(err, RenderError::ShaderNotFound(name) if name == "vertex"));
    }

    #[test]
    fn loads_blob_by_logical_name() {
        let dir = std::env::temp_dir().join(format!("tri-renderer-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("fragment.spv"), [0x03, 0x02, 0x23, 0x07]).unwrap();

        let source = DirShaderSource::new(&dir);
        let bytes = source.load(FRAGMENT_SHADER).unwrap();
        assert_eq!(bytes, vec![0x03, 0x02, 0x23, 0x07]);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
