use std::io::Write;

use env_logger::fmt::Formatter;

/// 带颜色的单行日志：`[时间] 级别 [文件:行号] 内容`
fn format_record(buf: &mut Formatter, record: &log::Record) -> std::io::Result<()> {
    let level_color = match record.level() {
        log::Level::Error => anstyle::AnsiColor::Red,
        log::Level::Warn => anstyle::AnsiColor::Yellow,
        log::Level::Info => anstyle::AnsiColor::Green,
        log::Level::Debug => anstyle::AnsiColor::Cyan,
        log::Level::Trace => anstyle::AnsiColor::Magenta,
    };
    let level_style = buf.default_level_style(record.level()).fg_color(Some(anstyle::Color::Ansi(level_color)));
    let grey_style = anstyle::Style::new().fg_color(Some(anstyle::Color::Rgb(anstyle::RgbColor(110, 110, 110))));

    let line = record.line().unwrap_or(!0);
    let file = record.file().unwrap_or("").rsplit(['/', '\\']).next().unwrap_or("");
    let time = chrono::Local::now().format("%H:%M:%S%.3f");
    let level = record.level();
    let thread = std::thread::current();
    let thread_name = thread.name().unwrap_or("?");

    writeln!(
        buf,
        "{level_style}[{time}] {level:<5}{level_style:#} {grey_style}[{thread_name}] [{file}:{line}]{grey_style:#} {}",
        record.args()
    )
}

/// 初始化全局 logger
///
/// 默认级别为 Info，可以通过 `RUST_LOG` 覆盖。
pub fn init_log() {
    env_logger::Builder::new()
        .format(format_record)
        .filter(None, log::LevelFilter::Info)
        .parse_default_env()
        .init();
}

/// 测试中使用，多次调用不会 panic，输出由测试框架捕获
pub fn init_test_log() {
    let _ = env_logger::Builder::new()
        .format(format_record)
        .filter(None, log::LevelFilter::Debug)
        .parse_default_env()
        .is_test(true)
        .try_init();
}
