/// One completed preset run, as logged to the daily data file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementRecord {
    pub test_name: String,
    pub pins: String,
    pub interval: String,
    pub units: String,
    pub value: String,
}

impl MeasurementRecord {
    /// Rows of the transposed block: label column, then value column.
    pub fn rows(&self) -> [[String; 2]; 5] {
        [
            [String::new(), "0".to_string()],
            [self.test_name.clone(), String::new()],
            ["Pins Toggled".to_string(), self.pins.clone()],
            ["Time Interval (s)".to_string(), self.interval.clone()],
            [format!("Measurement ({})", self.units), self.value.clone()],
        ]
    }
}
