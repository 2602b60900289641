//! Convert command: secure-boot header, environment block and data images

use std::fs;
use std::path::Path;

use nuwriter_core::config::{load_json, ConvertConfig, ConvertOutput};

/// Write every output of a convert run into `dir`, returning the file names
pub fn write_outputs(
    out: &ConvertOutput,
    dir: &Path,
) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::new();
    let mut put = |name: String, data: &[u8]| -> std::io::Result<()> {
        fs::write(dir.join(&name), data)?;
        written.push(name);
        Ok(())
    };

    if let Some((built, names)) = &out.header {
        put("header.bin".into(), built.header.as_slice())?;
        if let Some(keys) = &built.keys {
            put("header_key.txt".into(), keys.key_file_text().as_bytes())?;
        }
        for (name, data) in names.iter().zip(&built.encrypted) {
            put(format!("enc_{}", name), data.as_slice())?;
        }
    }

    if let Some(env) = &out.env {
        put("uboot-env.bin".into(), env.as_slice())?;
    }

    if let Some((keys, files)) = &out.data {
        put("data_key.txt".into(), keys.key_file_text().as_bytes())?;
        for f in files {
            put(format!("enc_{}", f.name), f.encrypted.as_slice())?;
            put(format!("sig_{}", f.name), f.signature.as_slice())?;
        }
    }

    Ok(written)
}

/// Run a convert config
pub fn cmd_convert(config: &Path, output: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config: ConvertConfig = load_json(config)?;
    let out = config.build()?;
    let written = write_outputs(&out, output)?;
    if written.is_empty() {
        return Err("Convert config has no header, env or data section".into());
    }
    for name in &written {
        println!("  {}", name);
    }
    println!("Converted {} file(s) into {}", written.len(), output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_writes_expected_files() {
        let dir = tempfile::tempdir().unwrap();
        let img = dir.path().join("bl2.bin");
        fs::write(&img, vec![0xA5; 300]).unwrap();
        let env = dir.path().join("env.txt");
        fs::write(&env, "bootdelay=1\nbaudrate=115200\n").unwrap();

        let config = dir.path().join("conv.json");
        fs::write(
            &config,
            format!(
                r#"{{
                    "env": {{"file": "{env}", "blksize": "0x1000"}},
                    "data": {{"image": [{{"file": "{img}"}}]}}
                }}"#,
                env = env.display(),
                img = img.display()
            ),
        )
        .unwrap();

        let out = dir.path().join("out");
        cmd_convert(&config, &out).unwrap();
        for name in ["uboot-env.bin", "data_key.txt", "enc_bl2.bin", "sig_bl2.bin"] {
            assert!(out.join(name).is_file(), "{} missing", name);
        }
        assert_eq!(fs::read(out.join("uboot-env.bin")).unwrap().len(), 0x1000);
        assert_eq!(fs::read(out.join("sig_bl2.bin")).unwrap().len(), 64);
        assert!(!out.join("header.bin").exists());
    }

    #[test]
    fn test_empty_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("conv.json");
        fs::write(&config, "{}").unwrap();
        assert!(cmd_convert(&config, &dir.path().join("out")).is_err());
    }
}
