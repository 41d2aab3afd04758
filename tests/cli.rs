use std::{fs, process::Command};

use assert_cmd::prelude::*;

#[test]
fn list_models() -> Result<(), Box<dyn std::error::Error>> {
    let output = Command::cargo_bin("scootflash")?.arg("list-models").output()?;
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout)?;
    for model in ["max", "g2", "4pro", "1s", "mi3"] {
        assert!(stdout.contains(model), "{model} missing from:\n{stdout}");
    }
    assert!(stdout.contains("0x1c000"));
    assert!(stdout.contains("0xf800"));

    Ok(())
}

#[test]
fn save_image() -> Result<(), Box<dyn std::error::Error>> {
    let dir = std::env::temp_dir().join(format!("scootflash-cli-{}", std::process::id()));
    let assets = dir.join("assets");
    fs::create_dir_all(assets.join("bin/bootloader"))?;
    fs::create_dir_all(assets.join("bin/data"))?;
    fs::write(assets.join("bin/bootloader/mi_DRV.bin"), [0xb0; 0x100])?;
    fs::write(assets.join("bin/data/default"), [0x00; 0x200])?;
    fs::write(dir.join("driver.bin"), [0xd0; 0x400])?;

    let image = dir.join("image.bin");
    Command::cargo_bin("scootflash")?
        .current_dir(&dir)
        .args(["save-image", "--model", "lite", "--serial", "SN123", "--odometer", "12.7"])
        .args(["--uid", "04030201-08070605-0c0b0a09", "--driver", "driver.bin"])
        .arg(&image)
        .assert()
        .success();

    let data = fs::read(&image)?;
    assert_eq!(data.len(), 0xf800 + 0x200);
    assert_eq!(&data[..0x100], &[0xb0; 0x100][..]);
    assert_eq!(&data[0x1000..0x1400], &[0xd0; 0x400][..]);
    assert_eq!(&data[0xf820..0xf825], b"SN123");
    assert_eq!(&data[0xf852..0xf856], &[0x9c, 0x31, 0x00, 0x00]);
    assert_eq!(&data[0xf9b4..0xf9b8], &[0x04, 0x03, 0x02, 0x01]);

    fs::remove_dir_all(dir)?;

    Ok(())
}

#[test]
fn rejects_invalid_driver_url() -> Result<(), Box<dyn std::error::Error>> {
    Command::cargo_bin("scootflash")?
        .args(["flash", "--model", "pro", "--probe", "dummy", "--yes"])
        .args(["--driver-url", "javascript://alert(1)"])
        .assert()
        .failure();

    Ok(())
}

#[test]
fn rejects_ftp_driver_url() -> Result<(), Box<dyn std::error::Error>> {
    let output = Command::cargo_bin("scootflash")?
        .env("RUST_LOG", "info")
        .args(["flash", "--model", "pro", "--probe", "dummy", "--yes"])
        .args(["--driver-url", "ftp://files.example.com/drv.bin"])
        .output()?;
    assert!(!output.status.success());

    let stderr = String::from_utf8(output.stderr)?;
    assert!(!stderr.contains("Attaching"), "{stderr}");

    Ok(())
}

#[test]
fn unreachable_driver_url_fails_before_attaching() -> Result<(), Box<dyn std::error::Error>> {
    let dir = std::env::temp_dir().join(format!("scootflash-cli-url-{}", std::process::id()));
    fs::create_dir_all(&dir)?;

    let output = Command::cargo_bin("scootflash")?
        .current_dir(&dir)
        .env("RUST_LOG", "info")
        .args(["flash", "--model", "pro", "--probe", "dummy", "--yes"])
        .args(["--driver-url", "http://127.0.0.1:1/drv.bin"])
        .output()?;
    assert!(!output.status.success());

    let stderr = String::from_utf8(output.stderr)?;
    assert!(stderr.contains("Failed to fetch"), "{stderr}");
    assert!(!stderr.contains("Attaching"), "{stderr}");
    assert!(!stderr.contains("Read protection removed"), "{stderr}");

    fs::remove_dir_all(dir)?;

    Ok(())
}

#[test]
fn clone_chip_can_be_disabled() -> Result<(), Box<dyn std::error::Error>> {
    let dir = std::env::temp_dir().join(format!("scootflash-cli-g2-{}", std::process::id()));
    let assets = dir.join("assets");
    fs::create_dir_all(assets.join("bin/bootloader"))?;
    fs::create_dir_all(assets.join("bin/data"))?;
    fs::write(assets.join("bin/bootloader/nb_DRV.bin"), [0xb0; 0x100])?;
    fs::write(assets.join("bin/bootloader/nb_DRV_AT32.bin"), [0xb1; 0x100])?;
    fs::write(assets.join("bin/data/default"), [0x00; 0x200])?;
    fs::write(dir.join("driver.bin"), [0xd0; 0x400])?;

    for (flag, bootloader) in [(None, 0xb1), (Some("--no-clone-chip"), 0xb0)] {
        let image = dir.join("g2.bin");
        Command::cargo_bin("scootflash")?
            .current_dir(&dir)
            .args(["save-image", "--model", "g2", "--driver", "driver.bin"])
            .args(["--uid", "000000000000000000000000"])
            .args(flag)
            .arg(&image)
            .assert()
            .success();

        let data = fs::read(&image)?;
        assert_eq!(data.len(), 0x1c000 + 0x200);
        assert_eq!(&data[..0x100], &[bootloader; 0x100][..]);
    }

    fs::remove_dir_all(dir)?;

    Ok(())
}

#[test]
fn rejects_unknown_model() -> Result<(), Box<dyn std::error::Error>> {
    Command::cargo_bin("scootflash")?
        .args(["save-image", "--model", "m365", "--uid", "000000000000000000000000", "out.bin"])
        .assert()
        .failure();

    Ok(())
}
