use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

use test_utils::TestWorkspace;

fn workbench_cmd() -> Command {
    Command::new(env!("CARGO_BIN_EXE_dbd-workbench"))
}

#[test]
fn test_help_lists_subcommands() {
    workbench_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("completions"));
}

#[test]
fn test_completions() {
    workbench_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("dbd-workbench"));
}

#[test]
fn test_run_without_phase_fails() {
    let workspace = TestWorkspace::new();
    let settings = workspace.write_settings("");

    workbench_cmd()
        .arg("run")
        .arg(&settings)
        .assert()
        .failure()
        .stderr(predicate::str::contains("No phase selected"));
}

#[test]
fn test_missing_settings_file() {
    let workspace = TestWorkspace::new();

    workbench_cmd()
        .arg("run")
        .arg(workspace.path("nope.yaml"))
        .arg("--list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load settings"));
}

#[test]
fn test_install_reconciles_profile() {
    let workspace = TestWorkspace::new();
    workspace.install_fixture();
    let settings = workspace.write_settings("");
    let paks = workspace.game_paks();

    workbench_cmd()
        .arg("run")
        .arg(&settings)
        .args(["--install", "--overwrite", "never"])
        .assert()
        .success();

    assert!(paks.join("pakchunk0-WindowsNoEditor.pak").is_file());
    assert!(paks.join("pakchunk790enhanced1v1-WindowsNoEditor.pak").is_file());
    assert!(!paks.join("pakchunk584sweet-WindowsNoEditor.pak").exists());
    assert!(workspace
        .path("paking/pakchunk584sweet-WindowsNoEditor.pak")
        .is_file());

    let manifest = fs::read_to_string(workspace.results_path()).unwrap();
    assert!(manifest.contains("installerActions"));
    assert!(manifest.contains("pakchunk584sweet-WindowsNoEditor.pak"));

    // A second run has nothing left to move
    workbench_cmd()
        .arg("run")
        .arg(&settings)
        .args(["--install", "--overwrite", "never"])
        .assert()
        .success()
        .stdout(predicate::str::contains("already match"));
}

#[test]
fn test_install_dry_run() {
    let workspace = TestWorkspace::new();
    workspace.install_fixture();
    let settings = workspace.write_settings("");

    workbench_cmd()
        .arg("run")
        .arg(&settings)
        .args(["--install", "--dry-run", "--overwrite", "never"])
        .assert()
        .success()
        .stdout(predicate::str::contains("move in"))
        .stdout(predicate::str::contains("move out"));

    assert!(workspace
        .game_paks()
        .join("pakchunk584sweet-WindowsNoEditor.pak")
        .is_file());
}

#[test]
fn test_rename_attachments() {
    let workspace = TestWorkspace::new();
    workspace.write_attachment("backpack.yaml", "KateBackpack", "SurvivorTorso", "Backpack");
    workspace.write_attachment("hat.yml", "KateHat", "SurvivorHead", "");
    let settings = workspace.write_settings("");

    workbench_cmd()
        .arg("run")
        .arg(&settings)
        .args(["--rename", "--overwrite", "never"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 attachment file(s) renamed"));

    let attachments = workspace.path("attachments");
    assert!(attachments.join("SocketAttachment_Torso_KateBackpack.yaml").is_file());
    assert!(attachments.join("SocketAttachment_Head_KateHat.yaml").is_file());
    assert!(!attachments.join("backpack.yaml").exists());
}

#[test]
fn test_mix_with_missing_item_db_still_writes_results() {
    let workspace = TestWorkspace::new();
    let settings = workspace.write_settings(
        "uassetGuiPath: tools/UAssetGUI\ncustomizationItemDbPath: cooked/CustomizationItemDB.uasset\n",
    );

    workbench_cmd()
        .arg("run")
        .arg(&settings)
        .args(["--mix", "--overwrite", "never"])
        .assert()
        .code(1);

    let manifest = fs::read_to_string(workspace.results_path()).unwrap();
    assert!(manifest.contains("mix phase"));
    assert!(manifest.contains("CustomizationItemDB.uasset"));
}

#[cfg(unix)]
#[test]
fn test_mix_end_to_end_with_fake_converter() {
    use test_utils::{base_row, item_db};

    let workspace = TestWorkspace::new();
    workspace.write_attachment("a.yaml", "KateBackpack", "SurvivorTorso", "Backpack");
    workspace.write_attachment("b.yaml", "KatePurpleHat", "SurvivorTorso", "Purple Hat");

    let table = workspace.path("table.json");
    let db = item_db(vec![base_row("KateCosmetic001", "Kate Cosmetic", "SurvivorTorso")]);
    fs::write(&table, serde_json::to_string_pretty(&db).unwrap()).unwrap();
    workspace.fake_converter(&table);

    let asset = workspace.path("cooked/CustomizationItemDB.uasset");
    workspace.touch(&asset);
    let settings = workspace.write_settings(
        "uassetGuiPath: tools/UAssetGUI\ncustomizationItemDbPath: cooked/CustomizationItemDB.uasset\n",
    );

    workbench_cmd()
        .arg("run")
        .arg(&settings)
        .args(["--mix", "--overwrite", "always"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Mixed 3 combination(s)"));

    // The fake converter copies the mixed JSON into the asset
    let mixed: serde_json::Value = serde_json::from_str(&fs::read_to_string(&asset).unwrap()).unwrap();
    let rows = mixed["Exports"][0]["Table"]["Data"].as_array().unwrap();
    let names: Vec<&str> = rows.iter().map(|r| r["Name"].as_str().unwrap()).collect();
    assert_eq!(names.len(), 4);
    assert_eq!(names[0], "KateCosmetic001");
    assert!(names.contains(&"KateCosmetic001_Torso_DBC9377930FDDECF6A418845157EAEC2"));

    let manifest = fs::read_to_string(workspace.results_path()).unwrap();
    assert!(manifest.contains("KateCosmetic001_Torso_DBC9377930FDDECF6A418845157EAEC2"));
    assert!(manifest.contains("SurvivorTorso:KatePurpleHat"));
}

#[cfg(unix)]
#[test]
fn test_pak_unpacks_source_pak_first() {
    let workspace = TestWorkspace::new();
    workspace.fake_packer();
    workspace.touch(&workspace.path("src/pakchunk11-WindowsNoEditor.pak"));
    let settings = workspace.write_settings(
        "unrealPakPath: tools/UnrealPak\nsrcPakPath: src/pakchunk11-WindowsNoEditor.pak\n\
         destPakNumber: 790\ndestPakName: enhanced1v1\ndestPakAssets: [/Game/Data/Items]\n",
    );

    workbench_cmd()
        .arg("run")
        .arg(&settings)
        .args(["--pak", "--overwrite", "always"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Unpacked"));

    assert!(workspace
        .path("paking/pakchunk11-WindowsNoEditor/DeadByDaylight/Content/Data/Items.uasset")
        .is_file());
    assert!(workspace
        .path("paking/pakchunk790enhanced1v1-WindowsNoEditor.pak")
        .is_file());

    let manifest = fs::read_to_string(workspace.results_path()).unwrap();
    assert!(manifest.contains("pakPath"));
    assert!(manifest.contains("pakchunk11-WindowsNoEditor.pak"));
}
