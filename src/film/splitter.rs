use rand::{ SeedableRng, seq::SliceRandom };
use rand::rngs::SmallRng;

/// Rectangular subregion of the canvas handed to one worker at a time
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RenderArea {
    pub id: usize,
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

/// Dispatch order of the tiles over the image
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TileOrder {
    /// Row-major from the top-left
    Linear,
    /// Deterministic permutation seeded by the image size
    Random,
    /// Sorted by distance from the canvas centre, nearest first
    Centre,
    /// Centre order with a bounded local shuffle to spread neighbouring
    /// tiles across threads
    CentreRandom,
}

impl TileOrder {
    pub fn from_name(name: &str) -> Option<TileOrder> {
        match name {
            "linear" => Some(TileOrder::Linear),
            "random" => Some(TileOrder::Random),
            "centre" => Some(TileOrder::Centre),
            "centre-random" => Some(TileOrder::CentreRandom),
            _ => None,
        }
    }
}

/// Pure subdivision of the canvas into tiles. Built once per render; workers
/// draw tiles by index through the film's atomic dispenser.
#[derive(Debug, Clone)]
pub struct ImageSplitter {
    areas: Vec<RenderArea>,
}

impl ImageSplitter {
    pub fn new(
        width: i32, height: i32, cx0: i32, cy0: i32,
        tile_size: i32, order: TileOrder, thread_count: usize,
    ) -> ImageSplitter {
        debug_assert!(tile_size > 0);
        let mut areas = Vec::new();
        let mut y = 0;
        while y < height {
            let h = tile_size.min(height - y);
            let mut x = 0;
            while x < width {
                let w = tile_size.min(width - x);
                areas.push(RenderArea { id: 0, x: cx0 + x, y: cy0 + y, w, h });
                x += tile_size;
            }
            y += tile_size;
        }

        match order {
            TileOrder::Linear => {}
            TileOrder::Random => {
                let mut rng = SmallRng::seed_from_u64(seed(width, height));
                areas.shuffle(&mut rng);
            }
            TileOrder::Centre => {
                sort_by_centre_distance(&mut areas, width, height, cx0, cy0);
            }
            TileOrder::CentreRandom => {
                sort_by_centre_distance(&mut areas, width, height, cx0, cy0);
                let mut rng = SmallRng::seed_from_u64(seed(width, height));
                let window = (thread_count.max(1) * 4).max(8);
                for chunk in areas.chunks_mut(window) {
                    chunk.shuffle(&mut rng);
                }
            }
        }

        for (id, area) in areas.iter_mut().enumerate() {
            area.id = id;
        }

        ImageSplitter { areas }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.areas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    pub fn get(&self, n: usize) -> Option<RenderArea> {
        self.areas.get(n).copied()
    }
}

fn seed(width: i32, height: i32) -> u64 {
    (width as u64) << 32 | height as u64 & 0xffff_ffff
}

fn sort_by_centre_distance(areas: &mut [RenderArea], width: i32, height: i32, cx0: i32, cy0: i32) {
    let centre_x = cx0 as f64 + width as f64 * 0.5;
    let centre_y = cy0 as f64 + height as f64 * 0.5;
    areas.sort_by(|a, b| {
        let da = dist2(a, centre_x, centre_y);
        let db = dist2(b, centre_x, centre_y);
        da.partial_cmp(&db).unwrap()
    });
}

fn dist2(a: &RenderArea, cx: f64, cy: f64) -> f64 {
    let ax = a.x as f64 + a.w as f64 * 0.5;
    let ay = a.y as f64 + a.h as f64 * 0.5;
    (ax - cx) * (ax - cx) + (ay - cy) * (ay - cy)
}

#[cfg(test)]
mod test {
    use super::*;

    fn coverage(splitter: &ImageSplitter, width: i32, height: i32) -> Vec<u32> {
        let mut hits = vec![0u32; (width * height) as usize];
        for n in 0..splitter.len() {
            let a = splitter.get(n).unwrap();
            for y in a.y..a.y + a.h {
                for x in a.x..a.x + a.w {
                    hits[(y * width + x) as usize] += 1;
                }
            }
        }
        hits
    }

    #[test]
    fn tiles_partition_the_canvas() {
        for &order in &[TileOrder::Linear, TileOrder::Random, TileOrder::Centre, TileOrder::CentreRandom] {
            let splitter = ImageSplitter::new(100, 70, 0, 0, 32, order, 4);
            let hits = coverage(&splitter, 100, 70);
            assert!(hits.iter().all(|&h| h == 1), "order {:?}", order);
        }
    }

    #[test]
    fn ids_match_dispatch_position() {
        let splitter = ImageSplitter::new(64, 64, 0, 0, 16, TileOrder::Random, 2);
        for n in 0..splitter.len() {
            assert_eq!(splitter.get(n).unwrap().id, n);
        }
        assert_eq!(splitter.get(splitter.len()), None);
    }

    #[test]
    fn random_order_is_deterministic() {
        let a = ImageSplitter::new(96, 96, 0, 0, 16, TileOrder::Random, 4);
        let b = ImageSplitter::new(96, 96, 0, 0, 16, TileOrder::Random, 4);
        for n in 0..a.len() {
            assert_eq!(a.get(n), b.get(n));
        }
    }

    #[test]
    fn centre_order_starts_in_the_middle() {
        let splitter = ImageSplitter::new(96, 96, 0, 0, 16, TileOrder::Centre, 1);
        let first = splitter.get(0).unwrap();
        // centre of the canvas is at 48; the first tile must contain it
        assert!(first.x <= 48 && first.x + first.w >= 48);
        assert!(first.y <= 48 && first.y + first.h >= 48);
    }

    #[test]
    fn cropped_canvas_offsets() {
        let splitter = ImageSplitter::new(40, 40, 10, 20, 32, TileOrder::Linear, 1);
        let first = splitter.get(0).unwrap();
        assert_eq!((first.x, first.y), (10, 20));
    }
}
