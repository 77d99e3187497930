use std::process::Command;

fn main() {
    // 获取 git 版本信息
    let git_hash = Command::new("git")
        .args(["describe", "--tags", "--always", "--dirty"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|hash| hash.trim().to_string())
        .filter(|hash| !hash.is_empty())
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=GIT_HASH={}", git_hash);

    // 确保外部工具可用
    for tool in ["ffmpeg", "yt-dlp"] {
        let check = Command::new(tool).arg("--version").output();
        if check.is_err() {
            println!("cargo:warning={} not found in PATH, downloads or processing will fail at runtime", tool);
        }
    }
}
