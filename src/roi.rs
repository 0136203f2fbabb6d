use serde::{Deserialize, Serialize};

/// Roi represents a region of interest on the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {

    /// Offset from the left in the horizontal direction
    pub offset_x: u32,

    /// Offset from the top in the vertical direction
    pub offset_y: u32,

    /// Image width
    pub width: u32,

    /// Image height
    pub height: u32
}

impl Roi {
    /// The whole sensor, anchored at the origin.
    pub fn full_sensor(width: u32, height: u32) -> Self {
        Self { offset_x: 0, offset_y: 0, width, height }
    }

    /// Number of pixels covered by this region.
    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Whether this region lies inside a sensor of the given size.
    pub fn fits(&self, sensor_width: u32, sensor_height: u32) -> bool {
        self.offset_x.checked_add(self.width).map_or(false, |r| r <= sensor_width)
            && self.offset_y.checked_add(self.height).map_or(false, |b| b <= sensor_height)
    }
}
