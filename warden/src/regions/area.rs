//! Region geometry

use std::str::FromStr;

use crate::error::{Error, Result};

/// Axis-aligned rectangle; both edges are part of the area
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Result<Self> {
        if width < 0 || height < 0 {
            return Err(Error::invalid(format!(
                "Region size {}x{} cannot be negative",
                width, height
            )));
        }
        Ok(Self {
            x,
            y,
            width,
            height,
        })
    }

    /// Inclusive on the min and max edge
    pub fn contains(&self, x: i32, y: i32) -> bool {
        let (x, y) = (i64::from(x), i64::from(y));
        let (left, top) = (i64::from(self.x), i64::from(self.y));
        x >= left
            && x <= left + i64::from(self.width)
            && y >= top
            && y <= top + i64::from(self.height)
    }

    /// Grow (or shrink with a negative amount) along one edge
    pub fn resized(&self, direction: Direction, amount: i32) -> Result<Self> {
        let overflow = || Error::invalid("Region coordinates out of range");
        let (mut x, mut y, mut width, mut height) = (self.x, self.y, self.width, self.height);
        match direction {
            Direction::Up => {
                y = y.checked_sub(amount).ok_or_else(overflow)?;
                height = height.checked_add(amount).ok_or_else(overflow)?;
            }
            Direction::Right => {
                width = width.checked_add(amount).ok_or_else(overflow)?;
            }
            Direction::Down => {
                height = height.checked_add(amount).ok_or_else(overflow)?;
            }
            Direction::Left => {
                x = x.checked_sub(amount).ok_or_else(overflow)?;
                width = width.checked_add(amount).ok_or_else(overflow)?;
            }
        }
        Rect::new(x, y, width, height)
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {}) {}x{}",
            self.x, self.y, self.width, self.height
        )
    }
}

/// Edge a resize applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Right,
    Down,
    Left,
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "u" | "up" | "0" => Ok(Direction::Up),
            "r" | "right" | "1" => Ok(Direction::Right),
            "d" | "down" | "2" => Ok(Direction::Down),
            "l" | "left" | "3" => Ok(Direction::Left),
            other => Err(Error::invalid(format!(
                "Invalid direction \"{}\"; use u, r, d or l",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_is_inclusive() {
        let rect = Rect::new(0, 0, 10, 10).unwrap();
        assert!(rect.contains(0, 0));
        assert!(rect.contains(10, 10));
        assert!(rect.contains(10, 0));
        assert!(!rect.contains(11, 10));
        assert!(!rect.contains(10, 11));
        assert!(!rect.contains(-1, 5));
    }

    #[test]
    fn test_degenerate_rect_holds_its_origin() {
        let rect = Rect::new(4, 4, 0, 0).unwrap();
        assert!(rect.contains(4, 4));
        assert!(!rect.contains(5, 4));
    }

    #[test]
    fn test_contains_near_limits() {
        let rect = Rect::new(i32::MAX - 1, 0, 10, 10).unwrap();
        assert!(rect.contains(i32::MAX, 5));
    }

    #[test]
    fn test_resize_each_edge() {
        let rect = Rect::new(10, 10, 5, 5).unwrap();
        assert_eq!(
            rect.resized(Direction::Up, 2).unwrap(),
            Rect::new(10, 8, 5, 7).unwrap()
        );
        assert_eq!(
            rect.resized(Direction::Right, 2).unwrap(),
            Rect::new(10, 10, 7, 5).unwrap()
        );
        assert_eq!(
            rect.resized(Direction::Down, 2).unwrap(),
            Rect::new(10, 10, 5, 7).unwrap()
        );
        assert_eq!(
            rect.resized(Direction::Left, 2).unwrap(),
            Rect::new(8, 10, 7, 5).unwrap()
        );
    }

    #[test]
    fn test_resize_cannot_go_negative() {
        let rect = Rect::new(0, 0, 5, 5).unwrap();
        assert!(rect.resized(Direction::Right, -5).is_ok());
        assert!(matches!(
            rect.resized(Direction::Right, -6),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!("u".parse::<Direction>().unwrap(), Direction::Up);
        assert_eq!("Left".parse::<Direction>().unwrap(), Direction::Left);
        assert_eq!("2".parse::<Direction>().unwrap(), Direction::Down);
        assert!("north".parse::<Direction>().is_err());
    }
}
