// Local order id allocation

use chrono::NaiveDateTime;

/// Issues ids of the form `{pid}-{MMDDHHMMSS}-{n}`.
///
/// The counter restarts at 1 whenever the second changes, so ids stay unique within
/// one process and sort roughly by submission time.
#[derive(Debug)]
pub struct OrderIdProducer {
    pid: u32,
    stamp: String,
    count: u64,
}

impl OrderIdProducer {
    /// Create a producer for the current process
    pub fn new() -> Self {
        Self::with_pid(std::process::id())
    }

    pub fn with_pid(pid: u32) -> Self {
        Self { pid, stamp: String::new(), count: 0 }
    }

    /// Allocate the next id for a submission made at `now`
    pub fn next_id(&mut self, now: NaiveDateTime) -> String {
        let stamp = now.format("%m%d%H%M%S").to_string();
        if self.stamp != stamp {
            self.stamp = stamp;
            self.count = 0;
        }
        self.count += 1;
        format!("{}-{}-{}", self.pid, self.stamp, self.count)
    }
}

impl Default for OrderIdProducer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap().and_hms_opt(9, 30, s).unwrap()
    }

    #[test]
    fn test_counter_within_one_second() {
        let mut producer = OrderIdProducer::with_pid(42);
        assert_eq!(producer.next_id(at(1)), "42-0304093001-1");
        assert_eq!(producer.next_id(at(1)), "42-0304093001-2");
    }

    #[test]
    fn test_counter_restarts_on_new_second() {
        let mut producer = OrderIdProducer::with_pid(42);
        producer.next_id(at(1));
        producer.next_id(at(1));
        assert_eq!(producer.next_id(at(2)), "42-0304093002-1");
    }
}
