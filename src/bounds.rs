/// Per-axis extent of a point set
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Bounds {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl Default for Bounds {
    fn default() -> Self {
        Bounds {
            min: [f64::INFINITY; 3],
            max: [f64::NEG_INFINITY; 3],
        }
    }
}

impl Bounds {
    /// True until the first point has been added
    pub fn is_empty(&self) -> bool {
        self.min[0] > self.max[0]
    }

    #[inline]
    pub fn expand_xyz(&mut self, xyz: [f64; 3]) {
        for (axis, v) in xyz.into_iter().enumerate() {
            if v < self.min[axis] {
                self.min[axis] = v;
            }
            if v > self.max[axis] {
                self.max[axis] = v;
            }
        }
    }

    /// `max - min` per axis, zero for empty bounds
    pub fn span(&self) -> [f64; 3] {
        if self.is_empty() {
            return [0.0; 3];
        }
        [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ]
    }

    /// Per-axis minimum, the origin for empty bounds
    pub fn origin(&self) -> [f64; 3] {
        if self.is_empty() {
            [0.0; 3]
        } else {
            self.min
        }
    }
}
