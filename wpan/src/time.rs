//! Time structures.
//!
//! - [`Instant`] is used to represent a point in time.
//! - [`Duration`] is used to represent a duration of time.
//! - [`TimerQueue`] holds pending deadlines, each tagged with a token.

use heapless::Vec;

#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Eq, Ord, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub struct Instant {
    us: i64,
}

impl Instant {
    /// Create a new `Instant` from microseconds since the epoch.
    pub const fn from_us(us: i64) -> Self {
        Self { us }
    }

    /// Create a new `Instant` from milliseconds since the epoch.
    pub const fn from_ms(ms: i64) -> Self {
        Self { us: ms * 1_000 }
    }

    /// Returns the point in time as microseconds since the epoch.
    pub const fn as_us(&self) -> i64 {
        self.us
    }

    /// Returns the point in time as milliseconds since the epoch.
    pub const fn as_ms(&self) -> i64 {
        self.us / 1_000
    }
}

#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Eq, Ord, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub struct Duration(i64);

impl Duration {
    pub const ZERO: Self = Self(0);

    /// Create a new `Duration` from microseconds.
    pub const fn from_us(us: i64) -> Self {
        Self(us)
    }

    /// Create a new `Duration` from milliseconds.
    pub const fn from_ms(ms: i64) -> Self {
        Self(ms * 1_000)
    }

    /// Create a new `Duration` from seconds.
    pub const fn from_secs(secs: i64) -> Self {
        Self(secs * 1_000_000)
    }

    /// Returns the duration as microseconds.
    pub const fn as_us(&self) -> i64 {
        self.0
    }

    /// Microseconds for a timer delay, clamped to `0..=u32::MAX`.
    pub fn as_delay_us(&self) -> u32 {
        u32::try_from(self.0.max(0)).unwrap_or(u32::MAX)
    }

    /// Returns the duration as milliseconds.
    pub const fn as_ms(&self) -> i64 {
        self.0 / 1_000
    }

    /// Multiply by `2^shift`, saturating on overflow.
    pub const fn shl(self, shift: u32) -> Self {
        match 1i64.checked_shl(shift) {
            Some(factor) => Self(self.0.saturating_mul(factor)),
            None => Self(i64::MAX),
        }
    }
}

impl core::ops::Sub for Instant {
    type Output = Duration;

    fn sub(self, rhs: Instant) -> Self::Output {
        Duration::from_us(self.as_us() - rhs.as_us())
    }
}

impl core::ops::Sub<Duration> for Instant {
    type Output = Self;

    fn sub(self, rhs: Duration) -> Self::Output {
        Self::from_us(self.us - rhs.as_us())
    }
}

impl core::ops::Add<Duration> for Instant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        Self::from_us(self.us + rhs.as_us())
    }
}

impl core::ops::AddAssign<Duration> for Instant {
    fn add_assign(&mut self, rhs: Duration) {
        self.us += rhs.as_us();
    }
}

impl core::ops::Sub for Duration {
    type Output = Self;

    fn sub(self, rhs: Duration) -> Self::Output {
        Self::from_us(self.as_us() - rhs.as_us())
    }
}

impl core::ops::Add for Duration {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        Self::from_us(self.as_us() + rhs.as_us())
    }
}

impl core::ops::Mul<usize> for Duration {
    type Output = Self;

    fn mul(self, rhs: usize) -> Self::Output {
        Self::from_us(self.as_us() * rhs as i64)
    }
}

impl core::ops::Div<usize> for Duration {
    type Output = Self;

    fn div(self, rhs: usize) -> Self::Output {
        Self::from_us(self.as_us() / rhs as i64)
    }
}

impl core::fmt::Display for Instant {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:.2}ms", self.as_us() as f32 / 1000.0)
    }
}

impl core::fmt::Display for Duration {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:.2}ms", self.as_us() as f32 / 1000.0)
    }
}

/// A source of the current time.
pub trait Clock {
    /// Return the current point in time.
    fn now(&self) -> Instant;
}

/// A bounded queue of deadlines.
///
/// A cancelled timer never fires: [`TimerQueue::cancel`] removes every entry
/// carrying the token, and [`TimerQueue::pop_expired`] only returns entries
/// still present.
#[derive(Debug)]
pub struct TimerQueue<T, const N: usize> {
    timers: Vec<(Instant, T), N>,
}

impl<T: Copy + PartialEq, const N: usize> Default for TimerQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy + PartialEq, const N: usize> TimerQueue<T, N> {
    pub const fn new() -> Self {
        Self { timers: Vec::new() }
    }

    /// Arm a timer. A timer already armed with the same token is replaced.
    ///
    /// Returns the token back when the queue is full.
    pub fn schedule(&mut self, deadline: Instant, token: T) -> Result<(), T> {
        self.cancel(token);
        self.timers.push((deadline, token)).map_err(|(_, token)| token)
    }

    /// Disarm every timer carrying `token`. Returns whether one was armed.
    pub fn cancel(&mut self, token: T) -> bool {
        let before = self.timers.len();
        self.timers.retain(|(_, t)| *t != token);
        before != self.timers.len()
    }

    /// Disarm every timer matching the predicate.
    pub fn cancel_matching(&mut self, mut f: impl FnMut(&T) -> bool) {
        self.timers.retain(|(_, t)| !f(t));
    }

    /// Return whether a timer with this token is armed.
    pub fn is_armed(&self, token: T) -> bool {
        self.timers.iter().any(|(_, t)| *t == token)
    }

    /// Return the deadline of a timer.
    pub fn deadline(&self, token: T) -> Option<Instant> {
        self.timers
            .iter()
            .find(|(_, t)| *t == token)
            .map(|(deadline, _)| *deadline)
    }

    /// Return the earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.iter().map(|(deadline, _)| *deadline).min()
    }

    /// Remove and return the earliest timer that expired at `now`.
    pub fn pop_expired(&mut self, now: Instant) -> Option<T> {
        let (index, _) = self
            .timers
            .iter()
            .enumerate()
            .filter(|(_, (deadline, _))| *deadline <= now)
            .min_by_key(|(_, (deadline, _))| *deadline)?;

        Some(self.timers.swap_remove(index).1)
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instant_operations() {
        let a = Instant::from_us(100);
        let b = Instant::from_us(50);
        assert_eq!((a - b).as_us(), 50);
        assert_eq!((a - Duration::from_us(50)).as_us(), 50);
        assert_eq!((a + Duration::from_us(50)).as_us(), 150);
        assert_eq!(Instant::from_ms(3).as_us(), 3_000);
    }

    #[test]
    fn duration_operations() {
        let a = Duration::from_us(100);
        let b = Duration::from_us(50);
        assert_eq!((a - b).as_us(), 50);
        assert_eq!((a * 2).as_us(), 200);
        assert_eq!((a / 2).as_us(), 50);
        assert_eq!((a + b).as_us(), 150);
        assert_eq!(Duration::from_secs(1), Duration::from_ms(1_000));
        assert_eq!(Duration::from_ms(200).shl(3), Duration::from_ms(1_600));
        assert_eq!(Duration::from_ms(1).shl(80).as_us(), i64::MAX);
    }

    #[test]
    fn delays_saturate() {
        assert_eq!(Duration::from_us(491_520).as_delay_us(), 491_520);
        assert_eq!(Duration::from_us(-5).as_delay_us(), 0);
        assert_eq!(Duration::from_secs(5_000).as_delay_us(), u32::MAX);
        assert_eq!(Duration::from_ms(1).shl(80).as_delay_us(), u32::MAX);
    }

    #[test]
    fn formatting() {
        let a = Instant::from_us(100);
        let b = Duration::from_us(100);
        assert_eq!(format!("{}", a), "0.10ms");
        assert_eq!(format!("{}", b), "0.10ms");
    }

    #[test]
    fn timers_fire_in_deadline_order() {
        let mut queue: TimerQueue<u8, 4> = TimerQueue::new();
        queue.schedule(Instant::from_ms(30), 3).unwrap();
        queue.schedule(Instant::from_ms(10), 1).unwrap();
        queue.schedule(Instant::from_ms(20), 2).unwrap();

        assert_eq!(queue.next_deadline(), Some(Instant::from_ms(10)));
        assert_eq!(queue.pop_expired(Instant::from_ms(5)), None);
        assert_eq!(queue.pop_expired(Instant::from_ms(25)), Some(1));
        assert_eq!(queue.pop_expired(Instant::from_ms(25)), Some(2));
        assert_eq!(queue.pop_expired(Instant::from_ms(25)), None);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn cancelled_timer_never_fires() {
        let mut queue: TimerQueue<u8, 4> = TimerQueue::new();
        queue.schedule(Instant::from_ms(10), 1).unwrap();
        assert!(queue.cancel(1));
        assert!(!queue.cancel(1));
        assert_eq!(queue.pop_expired(Instant::from_ms(100)), None);
    }

    #[test]
    fn rescheduling_replaces() {
        let mut queue: TimerQueue<u8, 2> = TimerQueue::new();
        queue.schedule(Instant::from_ms(10), 1).unwrap();
        queue.schedule(Instant::from_ms(50), 1).unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.deadline(1), Some(Instant::from_ms(50)));

        queue.schedule(Instant::from_ms(60), 2).unwrap();
        assert_eq!(queue.schedule(Instant::from_ms(70), 3), Err(3));
    }
}
