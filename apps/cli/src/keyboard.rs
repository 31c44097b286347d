//! 键盘事件源（crossterm）
//!
//! 在独立线程上读取终端按键，过滤系统自动重复后以 [`SessionEvent`]
//! 发送给控制线程。
//!
//! 支持 keyboard enhancement 协议的终端会上报松开事件；其余终端只有
//! 按下和自动重复，松开由 [`RepeatFilter`] 根据重复间隔推断。

use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded};
use crossterm::event::{
    self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, KeyboardEnhancementFlags,
    PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::{execute, terminal};
use science_control::{KeyInput, SessionEvent};
use std::collections::HashMap;
use std::io;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// 请求的 keyboard enhancement 标志
///
/// 普通字符键（w/s）只有在 `REPORT_ALL_KEYS_AS_ESCAPE_CODES` 下才会上报松开。
pub const ENHANCEMENT_FLAGS: KeyboardEnhancementFlags =
    KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES
        .union(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
        .union(KeyboardEnhancementFlags::REPORT_ALL_KEYS_AS_ESCAPE_CODES);

/// 轮询间隔，也是停止请求的最大响应延迟
const POLL_INTERVAL: Duration = Duration::from_millis(20);

// ============================================================
// 自动重复过滤
// ============================================================

/// 终端上报的按键类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Press,
    Repeat,
    Release,
}

/// 松开事件的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseMode {
    /// 终端上报松开
    Reported,
    /// 由重复间隔推断松开
    Synthesized,
}

/// 自动重复过滤器
///
/// 保证每次物理按下最多产生一个 Press，并且每个 Press 最终配对一个 Release。
#[derive(Debug)]
pub struct RepeatFilter {
    mode: ReleaseMode,
    first_repeat_grace: Duration,
    repeat_delay: Duration,
    /// 按住的键 -> 推断松开的截止时间
    held: HashMap<String, Instant>,
}

impl RepeatFilter {
    pub fn new(mode: ReleaseMode, first_repeat_grace: Duration, repeat_delay: Duration) -> Self {
        Self {
            mode,
            first_repeat_grace,
            repeat_delay,
            held: HashMap::new(),
        }
    }

    pub fn is_held(&self, key: &str) -> bool {
        self.held.contains_key(key)
    }

    /// 处理一个终端按键事件
    pub fn on_key(&mut self, key: &str, kind: KeyKind, now: Instant) -> Vec<KeyInput> {
        let mut out = Vec::new();

        match kind {
            KeyKind::Press | KeyKind::Repeat => {
                if let Some(deadline) = self.held.get_mut(key) {
                    // 自动重复
                    *deadline = now + self.repeat_delay;
                    return out;
                }
                if kind == KeyKind::Repeat && self.mode == ReleaseMode::Reported {
                    return out;
                }
                if self.mode == ReleaseMode::Synthesized {
                    // 只有最后按下的键会自动重复，其余键视为已松开
                    out.extend(self.release_all());
                }
                self.held.insert(key.to_string(), now + self.first_repeat_grace);
                out.push(KeyInput::press(key));
            },
            KeyKind::Release => {
                if self.held.remove(key).is_some() {
                    out.push(KeyInput::release(key));
                }
            },
        }

        out
    }

    /// 推断超时的松开
    pub fn on_tick(&mut self, now: Instant) -> Vec<KeyInput> {
        if self.mode == ReleaseMode::Reported {
            return Vec::new();
        }

        let expired: Vec<String> = self
            .held
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(key, _)| key.clone())
            .collect();

        expired
            .into_iter()
            .map(|key| {
                self.held.remove(&key);
                KeyInput::release(key)
            })
            .collect()
    }

    /// 最近的推断截止时间
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.mode {
            ReleaseMode::Reported => None,
            ReleaseMode::Synthesized => self.held.values().min().copied(),
        }
    }

    /// 松开所有按住的键（事件源关闭时使用）
    pub fn release_all(&mut self) -> Vec<KeyInput> {
        let mut keys: Vec<String> = self.held.drain().map(|(key, _)| key).collect();
        keys.sort();
        keys.into_iter().map(KeyInput::release).collect()
    }
}

/// 终端键码 -> 按键名
pub fn key_name(code: KeyCode) -> Option<String> {
    match code {
        KeyCode::Up => Some("up".to_string()),
        KeyCode::Down => Some("down".to_string()),
        KeyCode::Left => Some("left".to_string()),
        KeyCode::Right => Some("right".to_string()),
        KeyCode::Char(c) => Some(c.to_string()),
        _ => None,
    }
}

fn is_interrupt(key: &KeyEvent) -> bool {
    key.modifiers.contains(KeyModifiers::CONTROL)
        && matches!(key.code, KeyCode::Char('c') | KeyCode::Char('C'))
}

// ============================================================
// 终端状态
// ============================================================

/// raw 模式守卫，Drop 时恢复终端
pub struct RawTerminal {
    enhanced: bool,
}

impl RawTerminal {
    pub fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;

        let enhanced = matches!(terminal::supports_keyboard_enhancement(), Ok(true))
            && execute!(io::stdout(), PushKeyboardEnhancementFlags(ENHANCEMENT_FLAGS)).is_ok();

        Ok(Self { enhanced })
    }

    pub fn release_mode(&self) -> ReleaseMode {
        if self.enhanced {
            ReleaseMode::Reported
        } else {
            ReleaseMode::Synthesized
        }
    }
}

impl Drop for RawTerminal {
    fn drop(&mut self) {
        if self.enhanced {
            let _ = execute!(io::stdout(), PopKeyboardEnhancementFlags);
        }
        if let Err(e) = terminal::disable_raw_mode() {
            warn!("Failed to restore terminal mode: {}", e);
        }
    }
}

// ============================================================
// 输入线程
// ============================================================

/// 键盘输入线程句柄
pub struct KeyboardSource {
    stop_tx: Sender<()>,
    thread: Option<JoinHandle<()>>,
    terminal: Option<RawTerminal>,
}

impl KeyboardSource {
    /// 进入 raw 模式并启动输入线程
    pub fn spawn(
        events: Sender<SessionEvent>,
        first_repeat_grace: Duration,
        repeat_delay: Duration,
    ) -> io::Result<Self> {
        let terminal = RawTerminal::enable()?;
        let mode = terminal.release_mode();
        debug!("Keyboard release mode: {:?}", mode);

        let filter = RepeatFilter::new(mode, first_repeat_grace, repeat_delay);
        let (stop_tx, stop_rx) = bounded(1);

        let thread = thread::Builder::new()
            .name("science-keyboard".into())
            .spawn(move || input_loop(filter, &events, &stop_rx))?;

        Ok(Self {
            stop_tx,
            thread: Some(thread),
            terminal: Some(terminal),
        })
    }

    /// 停止输入线程并恢复终端；可重复调用
    pub fn stop(&mut self) {
        let _ = self.stop_tx.try_send(());
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            error!("Keyboard thread panicked");
        }
        self.terminal.take();
    }
}

impl Drop for KeyboardSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn input_loop(mut filter: RepeatFilter, events: &Sender<SessionEvent>, stop_rx: &Receiver<()>) {
    let forward = |inputs: Vec<KeyInput>| {
        inputs
            .into_iter()
            .all(|input| events.send(SessionEvent::Key(input)).is_ok())
    };

    loop {
        match stop_rx.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => break,
            Err(TryRecvError::Empty) => {},
        }

        let now = Instant::now();
        let timeout = filter
            .next_deadline()
            .map(|deadline| deadline.saturating_duration_since(now).min(POLL_INTERVAL))
            .unwrap_or(POLL_INTERVAL);

        let inputs = match event::poll(timeout) {
            Ok(true) => match event::read() {
                Ok(Event::Key(key)) if is_interrupt(&key) => {
                    let _ = events.send(SessionEvent::Interrupt);
                    break;
                },
                Ok(Event::Key(key)) => {
                    let kind = match key.kind {
                        KeyEventKind::Press => KeyKind::Press,
                        KeyEventKind::Repeat => KeyKind::Repeat,
                        KeyEventKind::Release => KeyKind::Release,
                    };
                    match key_name(key.code) {
                        Some(name) => filter.on_key(&name, kind, Instant::now()),
                        None => Vec::new(),
                    }
                },
                Ok(_) => Vec::new(),
                Err(e) => {
                    error!("Keyboard read failed: {}", e);
                    let _ = events.send(SessionEvent::Interrupt);
                    break;
                },
            },
            Ok(false) => Vec::new(),
            Err(e) => {
                error!("Keyboard poll failed: {}", e);
                let _ = events.send(SessionEvent::Interrupt);
                break;
            },
        };

        if !forward(inputs) || !forward(filter.on_tick(Instant::now())) {
            break;
        }
    }

    forward(filter.release_all());
}

#[cfg(test)]
mod tests {
    use super::*;
    use science_control::KeyAction;

    const GRACE: Duration = Duration::from_millis(750);
    const DELAY: Duration = Duration::from_millis(50);

    fn synthesized() -> RepeatFilter {
        RepeatFilter::new(ReleaseMode::Synthesized, GRACE, DELAY)
    }

    fn reported() -> RepeatFilter {
        RepeatFilter::new(ReleaseMode::Reported, GRACE, DELAY)
    }

    /// 按住一个键：`first` 后开始自动重复，每 `interval` 一次，直到 `until`；
    /// 每 10 ms tick 一次。返回过滤后的全部事件。
    fn hold(
        f: &mut RepeatFilter,
        key: &str,
        first: Duration,
        interval: Duration,
        until: Duration,
    ) -> Vec<KeyInput> {
        let t0 = Instant::now();
        let tick = Duration::from_millis(10);
        let mut out = f.on_key(key, KeyKind::Press, t0);

        let mut next_repeat = first;
        let mut t = Duration::ZERO;
        while t <= until + GRACE {
            if next_repeat <= t && next_repeat <= until {
                out.extend(f.on_key(key, KeyKind::Press, t0 + next_repeat));
                next_repeat += interval;
            }
            out.extend(f.on_tick(t0 + t));
            t += tick;
        }
        out
    }

    #[test]
    fn test_repeats_are_swallowed() {
        let t0 = Instant::now();
        let mut f = synthesized();

        assert_eq!(f.on_key("right", KeyKind::Press, t0), vec![KeyInput::press("right")]);
        for i in 1..10 {
            let t = t0 + GRACE + DELAY * i / 2;
            assert!(f.on_key("right", KeyKind::Press, t).is_empty());
        }
        assert!(f.is_held("right"));
    }

    #[test]
    fn test_release_synthesized_after_grace() {
        let t0 = Instant::now();
        let mut f = synthesized();
        f.on_key("w", KeyKind::Press, t0);

        // 第一次重复之前不松开
        assert!(f.on_tick(t0 + Duration::from_millis(700)).is_empty());
        assert_eq!(f.on_tick(t0 + GRACE), vec![KeyInput::release("w")]);
        assert!(!f.is_held("w"));
        assert_eq!(f.next_deadline(), None);
    }

    #[test]
    fn test_release_synthesized_after_repeats_stop() {
        let t0 = Instant::now();
        let mut f = synthesized();
        f.on_key("up", KeyKind::Press, t0);

        let last = t0 + Duration::from_millis(800);
        f.on_key("up", KeyKind::Press, last);
        assert_eq!(f.next_deadline(), Some(last + DELAY));
        assert!(f.on_tick(last + DELAY / 2).is_empty());
        assert_eq!(f.on_tick(last + DELAY), vec![KeyInput::release("up")]);
    }

    #[test]
    fn test_other_key_releases_held_key() {
        let t0 = Instant::now();
        let mut f = synthesized();
        f.on_key("w", KeyKind::Press, t0);

        let out = f.on_key("up", KeyKind::Press, t0 + Duration::from_millis(10));
        assert_eq!(out, vec![KeyInput::release("w"), KeyInput::press("up")]);
    }

    #[test]
    fn test_reported_mode_tracks_release_events() {
        let t0 = Instant::now();
        let mut f = reported();

        assert_eq!(f.on_key("w", KeyKind::Press, t0).len(), 1);
        assert!(f.on_key("w", KeyKind::Repeat, t0).is_empty());
        assert!(f.on_key("w", KeyKind::Press, t0).is_empty());
        // 多键同时按住
        assert_eq!(f.on_key("up", KeyKind::Press, t0), vec![KeyInput::press("up")]);
        assert!(f.on_tick(t0 + Duration::from_secs(5)).is_empty());

        assert_eq!(f.on_key("w", KeyKind::Release, t0), vec![KeyInput::release("w")]);
        assert!(f.on_key("w", KeyKind::Release, t0).is_empty());
        assert!(f.is_held("up"));
    }

    #[test]
    fn test_stray_repeat_without_press_ignored_when_reported() {
        let mut f = reported();
        assert!(f.on_key("s", KeyKind::Repeat, Instant::now()).is_empty());
    }

    #[test]
    fn test_release_all_pairs_every_press() {
        let t0 = Instant::now();
        let mut f = reported();
        f.on_key("w", KeyKind::Press, t0);
        f.on_key("down", KeyKind::Press, t0);

        let released = f.release_all();
        assert_eq!(released.len(), 2);
        assert!(released.iter().all(|k| k.action == KeyAction::Release));
        assert!(f.release_all().is_empty());
    }

    #[test]
    fn test_x11_default_repeat_is_one_press() {
        // X11 默认：660 ms 后开始，每 40 ms 重复一次
        let mut f = synthesized();
        let events = hold(
            &mut f,
            "right",
            Duration::from_millis(660),
            Duration::from_millis(40),
            Duration::from_millis(1500),
        );

        assert_eq!(events, vec![KeyInput::press("right"), KeyInput::release("right")]);
    }

    #[test]
    fn test_grace_shorter_than_os_delay_splits_hold() {
        let mut f = RepeatFilter::new(ReleaseMode::Synthesized, Duration::from_millis(500), DELAY);
        let events = hold(
            &mut f,
            "right",
            Duration::from_millis(660),
            Duration::from_millis(40),
            Duration::from_millis(1500),
        );

        let presses = events.iter().filter(|k| k.action == KeyAction::Press).count();
        assert_eq!(presses, 2);
    }

    #[test]
    fn test_enhancement_reports_plain_key_releases() {
        assert!(ENHANCEMENT_FLAGS.contains(KeyboardEnhancementFlags::REPORT_EVENT_TYPES));
        assert!(ENHANCEMENT_FLAGS.contains(KeyboardEnhancementFlags::REPORT_ALL_KEYS_AS_ESCAPE_CODES));
        assert!(ENHANCEMENT_FLAGS.contains(KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES));
    }

    #[test]
    fn test_reported_drill_key_can_be_pressed_again() {
        let t0 = Instant::now();
        let mut f = reported();

        assert_eq!(f.on_key("w", KeyKind::Press, t0), vec![KeyInput::press("w")]);
        assert!(f.on_key("w", KeyKind::Repeat, t0 + GRACE).is_empty());
        assert_eq!(
            f.on_key("w", KeyKind::Release, t0 + Duration::from_secs(30)),
            vec![KeyInput::release("w")]
        );
        assert_eq!(
            f.on_key("w", KeyKind::Press, t0 + Duration::from_secs(31)),
            vec![KeyInput::press("w")]
        );
    }

    #[test]
    fn test_key_names() {
        assert_eq!(key_name(KeyCode::Up).as_deref(), Some("up"));
        assert_eq!(key_name(KeyCode::Right).as_deref(), Some("right"));
        assert_eq!(key_name(KeyCode::Char('w')).as_deref(), Some("w"));
        assert_eq!(key_name(KeyCode::Enter), None);
    }

    #[test]
    fn test_ctrl_c_is_interrupt() {
        let key = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert!(is_interrupt(&key));
        assert!(!is_interrupt(&KeyEvent::new(KeyCode::Char('c'), KeyModifiers::NONE)));
    }
}
