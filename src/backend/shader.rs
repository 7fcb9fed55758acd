// Shader module loading
//
// Shaders are precompiled to SPIR-V by build.rs and read from disk at startup.

use anyhow::{Context, Result};
use ash::vk;
use std::io::Cursor;
use std::path::Path;
use super::VulkanDevice;

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Decode SPIR-V bytes into words, checking length and magic number
pub fn parse_spirv(bytes: &[u8]) -> Result<Vec<u32>> {
    // read_spv handles alignment and a byte-swapped magic number
    let words = ash::util::read_spv(&mut Cursor::new(bytes))
        .context("Failed to decode SPIR-V words")?;

    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(words),
        Some(&other) => anyhow::bail!("Not SPIR-V: bad magic number {:#010x}", other),
        None => anyhow::bail!("SPIR-V binary is empty"),
    }
}

/// Load a SPIR-V file and create a shader module from it
pub fn load_shader_module(device: &VulkanDevice, path: &Path) -> Result<vk::ShaderModule> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read shader {:?}", path))?;
    let code = parse_spirv(&bytes)
        .with_context(|| format!("Invalid shader {:?}", path))?;

    let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);

    let module = unsafe {
        device.device.create_shader_module(&create_info, None)
            .with_context(|| format!("Failed to create shader module from {:?}", path))?
    };
    log::info!("Loaded shader {:?} ({} bytes)", path, bytes.len());

    Ok(module)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words_to_bytes(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn accepts_spirv_header() {
        let bytes = words_to_bytes(&[SPIRV_MAGIC, 0x0001_0000, 0, 8, 0]);
        let words = parse_spirv(&bytes).unwrap();
        assert_eq!(words.len(), 5);
        assert_eq!(words[3], 8);
    }

    #[test]
    fn accepts_big_endian_module() {
        let bytes: Vec<u8> = [SPIRV_MAGIC, 0x0001_0000]
            .iter()
            .flat_map(|w| w.to_be_bytes())
            .collect();
        let words = parse_spirv(&bytes).unwrap();
        assert_eq!(words[0], SPIRV_MAGIC);
        assert_eq!(words[1], 0x0001_0000);
    }

    #[test]
    fn rejects_truncated_words() {
        let mut bytes = words_to_bytes(&[SPIRV_MAGIC, 1]);
        bytes.pop();
        assert!(parse_spirv(&bytes).is_err());
    }

    #[test]
    fn rejects_wrong_magic() {
        let bytes = b"#version 450\n\0\0\0".to_vec();
        assert_eq!(bytes.len() % 4, 0);
        assert!(parse_spirv(&bytes).is_err());
    }

    #[test]
    fn rejects_empty_input() {
        assert!(parse_spirv(&[]).is_err());
    }
}
