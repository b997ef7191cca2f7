/// One raw key transition on a logical column, stamped with the song time it
/// happened at. Device polling lives outside the engine.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InputEdge {
    pub column: usize,
    pub pressed: bool,
    pub event_time: f32,
}

impl InputEdge {
    #[inline(always)]
    pub const fn press(column: usize, event_time: f32) -> Self {
        Self { column, pressed: true, event_time }
    }

    #[inline(always)]
    pub const fn release(column: usize, event_time: f32) -> Self {
        Self { column, pressed: false, event_time }
    }
}
