/// Accumulating timer for periodic simulation work (egg laying, role reviews).
/// Counts up from its initial value; ready once it reaches `max_value`.
#[derive(Debug, Clone)]
pub struct Timer {
    pub max_value: f32,
    pub value: f32,
}

impl Timer {
    pub fn new(max_value: f32, initial_value: f32) -> Self {
        Self {
            max_value,
            value: initial_value,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.value >= self.max_value
    }

    pub fn update(&mut self, dt: f32) {
        self.value += dt;
    }

    /// Keeps the overshoot past `max_value` so periods do not drift.
    pub fn wrap(&mut self) {
        if self.max_value > 0.0 {
            self.value %= self.max_value;
        } else {
            self.value = 0.0;
        }
    }
}
