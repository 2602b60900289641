//! Pack container commands

use std::fs;
use std::path::Path;

use nuwriter_core::config::{load_json, PackConfig};
use nuwriter_core::container::pack::{pack, stuff, unpack};
use nuwriter_core::ImageType;

use super::read_file;

fn type_name(code: u32) -> String {
    match ImageType::from_code(code) {
        Some(t) => format!("{:?}", t).to_lowercase(),
        None => format!("0x{:X}", code),
    }
}

/// Build a pack file from a JSON config
pub fn cmd_create(config: &Path, output: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config: PackConfig = load_json(config)?;
    let images = config.load_images()?;
    let container = pack(&images);
    fs::write(output, &container)?;
    println!(
        "Packed {} image(s) into {} ({} bytes)",
        images.len(),
        output.display(),
        container.len()
    );
    Ok(())
}

/// Build a flat image from a JSON config
pub fn cmd_stuff(config: &Path, output: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config: PackConfig = load_json(config)?;
    let images = config.load_images()?;
    let flat = stuff(&images)?;
    fs::write(output, &flat)?;
    println!(
        "Stuffed {} image(s) into {} ({} bytes)",
        images.len(),
        output.display(),
        flat.len()
    );
    Ok(())
}

/// Write every image of a pack file to `img<N>.bin` in `output`
pub fn cmd_unpack(input: &Path, output: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let buf = read_file(input)?;
    let image = unpack(&buf)?;
    fs::create_dir_all(output)?;

    for (i, entry) in image.entries().iter().enumerate() {
        let path = output.join(format!("img{}.bin", i));
        fs::write(&path, image.entry_data(i)?)?;
        println!(
            "  {:<10} offset 0x{:08X} length {:>10} type {}",
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            entry.offset,
            entry.length,
            type_name(entry.image_type)
        );
    }
    println!(
        "Unpack images to directory {} complete",
        output.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_create_then_unpack() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        fs::write(&a, vec![0x11; 100]).unwrap();
        fs::write(&b, vec![0x22; 50]).unwrap();
        let config = dir.path().join("pack.json");
        fs::write(
            &config,
            format!(
                r#"{{"image": [{{"file": "{}", "offset": "0x0", "type": "uboot"}},
                              {{"file": "{}", "offset": "0x1000", "type": 0}}]}}"#,
                a.display(),
                b.display()
            ),
        )
        .unwrap();

        let packed = dir.path().join("pack.bin");
        cmd_create(&config, &packed).unwrap();
        let out = dir.path().join("unpack");
        cmd_unpack(&packed, &out).unwrap();
        assert_eq!(fs::read(out.join("img0.bin")).unwrap(), vec![0x11; 100]);
        assert_eq!(fs::read(out.join("img1.bin")).unwrap(), vec![0x22; 50]);

        let flat = dir.path().join("stuff.bin");
        cmd_stuff(&config, &flat).unwrap();
        let flat = fs::read(flat).unwrap();
        assert_eq!(flat.len(), 0x1000 + 50);
        assert_eq!(flat[100], 0xFF);
    }

    #[test]
    fn test_type_name() {
        assert_eq!(type_name(2), "uboot");
        assert_eq!(type_name(0x77), "0x77");
    }
}
