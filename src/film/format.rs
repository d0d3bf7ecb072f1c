//! Binary film file format: a bit-level stable snapshot of the weight
//! raster and every layer accumulator, used to resume partial renders and
//! to combine films rendered on several machines.
//!
//! ```text
//! bytes   field
//! 14      magic "YAF_FILMv4_0_0"
//!  4      u32 computer_node_id
//!  4      u32 base_sampling_offset
//!  4      u32 sampling_offset
//! 24      i32 width, height, cx0, cx1, cy0, cy1
//!  4      i32 layer_count
//! W*H*4   f32 weights, row-major, (0, 0) top-left
//! then per layer, in registration order: W*H*16 f32 rgba
//! ```
//! All values little-endian.

use std::fs::{ self, File };
use std::io::{ self, BufReader, BufWriter, Read, Write };
use std::path::{ Path, PathBuf };

use log::{ info, warn };

use crate::color::Rgba;
use crate::error::Error;
use super::{ Buffer2D, ImageFilm };

const FILM_MAGIC: &[u8; 14] = b"YAF_FILMv4_0_0";

struct LoadedFilm {
    computer_node: u32,
    base_sampling_offset: u32,
    sampling_offset: u32,
    weights: Buffer2D<f32>,
    layers: Vec<Buffer2D<Rgba>>,
}

fn read_u32(reader: &mut impl Read) -> io::Result<u32> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    Ok(u32::from_le_bytes(bytes))
}

fn read_i32(reader: &mut impl Read) -> io::Result<i32> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    Ok(i32::from_le_bytes(bytes))
}

fn read_f32(reader: &mut impl Read) -> io::Result<f32> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    Ok(f32::from_le_bytes(bytes))
}

fn check(what: &'static str, expected: i32, found: i32) -> Result<(), Error> {
    if expected != found {
        return Err(Error::FilmMismatch {
            what,
            expected: expected as i64,
            found: found as i64,
        });
    }
    Ok(())
}

impl ImageFilm {
    /// Path of this film's on-disk state, derived from the configured base
    /// path and the computer node id
    pub fn film_path(&self) -> PathBuf {
        let base = self.film_load_save.path.to_string_lossy().into_owned();
        PathBuf::from(format!("{} - node {:04}.film", base, self.computer_node))
    }

    /// Serialize the current accumulators. The raster lock is held only
    /// while snapshotting to memory; file I/O happens outside it so workers
    /// resume after a short stall instead of a full disk write.
    pub fn save_film(&self) -> Result<PathBuf, Error> {
        let path = self.film_path();
        info!("film: saving state to {}", path.display());
        self.backup_previous_film(&path);

        let (weights, layers) = {
            let raster = self.raster.lock();
            let layers: Vec<Buffer2D<Rgba>> =
                raster.layers.iter().map(|(_, image)| image.clone()).collect();
            (raster.weights.clone(), layers)
        };

        let file = File::create(&path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(FILM_MAGIC)?;
        writer.write_all(&self.computer_node.to_le_bytes())?;
        writer.write_all(&self.base_sampling_offset.to_le_bytes())?;
        writer.write_all(&self.sampling_offset.to_le_bytes())?;
        writer.write_all(&self.width.to_le_bytes())?;
        writer.write_all(&self.height.to_le_bytes())?;
        writer.write_all(&self.cx0.to_le_bytes())?;
        writer.write_all(&self.cx1.to_le_bytes())?;
        writer.write_all(&self.cy0.to_le_bytes())?;
        writer.write_all(&self.cy1.to_le_bytes())?;
        writer.write_all(&(layers.len() as i32).to_le_bytes())?;

        for y in 0..self.height as usize {
            for x in 0..self.width as usize {
                writer.write_all(&weights.get(x, y).to_le_bytes())?;
            }
        }
        for image in layers.iter() {
            for y in 0..self.height as usize {
                for x in 0..self.width as usize {
                    let c = image.get(x, y);
                    writer.write_all(&c.r.to_le_bytes())?;
                    writer.write_all(&c.g.to_le_bytes())?;
                    writer.write_all(&c.b.to_le_bytes())?;
                    writer.write_all(&c.a.to_le_bytes())?;
                }
            }
        }
        writer.flush()?;
        Ok(path)
    }

    /// Keep the previous film file around as a backup before overwriting
    fn backup_previous_film(&self, path: &Path) {
        if path.exists() {
            let mut backup = path.as_os_str().to_owned();
            backup.push("-previous.bak");
            if let Err(e) = fs::rename(path, PathBuf::from(&backup)) {
                warn!("film: could not back up previous film file: {}", e);
            }
        }
    }

    fn read_film_file(&self, path: &Path) -> Result<LoadedFilm, Error> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 14];
        reader.read_exact(&mut magic)?;
        if &magic != FILM_MAGIC {
            return Err(Error::FilmMagic);
        }

        let computer_node = read_u32(&mut reader)?;
        let base_sampling_offset = read_u32(&mut reader)?;
        let sampling_offset = read_u32(&mut reader)?;

        check("image width", self.width, read_i32(&mut reader)?)?;
        check("image height", self.height, read_i32(&mut reader)?)?;
        check("border cx0", self.cx0, read_i32(&mut reader)?)?;
        check("border cx1", self.cx1, read_i32(&mut reader)?)?;
        check("border cy0", self.cy0, read_i32(&mut reader)?)?;
        check("border cy1", self.cy1, read_i32(&mut reader)?)?;
        let layer_count = self.raster.lock().layers.len();
        check("layer count", layer_count as i32, read_i32(&mut reader)?)?;

        let (w, h) = (self.width as usize, self.height as usize);
        let mut weights = Buffer2D::new(w, h);
        for y in 0..h {
            for x in 0..w {
                weights.set(x, y, read_f32(&mut reader)?);
            }
        }
        let mut layers = Vec::with_capacity(layer_count);
        for _ in 0..layer_count {
            let mut image = Buffer2D::new(w, h);
            for y in 0..h {
                for x in 0..w {
                    let r = read_f32(&mut reader)?;
                    let g = read_f32(&mut reader)?;
                    let b = read_f32(&mut reader)?;
                    let a = read_f32(&mut reader)?;
                    image.set(x, y, Rgba::new(r, g, b, a));
                }
            }
            layers.push(image);
        }

        Ok(LoadedFilm {
            computer_node,
            base_sampling_offset,
            sampling_offset,
            weights,
            layers,
        })
    }

    /// Load one film file and combine it into the current accumulators:
    /// weights and layers add pixel-wise, sampling offsets take the max.
    pub fn load_film(&mut self, path: &Path) -> Result<(), Error> {
        info!("film: loading film from {}", path.display());
        let loaded = self.read_film_file(path)?;

        let raster = self.raster.get_mut();
        let (w, h) = (self.width as usize, self.height as usize);
        for y in 0..h {
            for x in 0..w {
                let sum = raster.weights.get(x, y) + loaded.weights.get(x, y);
                raster.weights.set(x, y, sum);
            }
        }
        for (slot, image) in raster.layers.iter_mut().zip(loaded.layers.iter()) {
            for y in 0..h {
                for x in 0..w {
                    let sum = slot.1.get(x, y) + image.get(x, y);
                    slot.1.set(x, y, sum);
                }
            }
        }
        self.computer_node = loaded.computer_node;
        self.sampling_offset = self.sampling_offset.max(loaded.sampling_offset);
        self.base_sampling_offset = self.base_sampling_offset.max(loaded.base_sampling_offset);
        Ok(())
    }

    /// Scan the output folder for matching film files and combine every one
    /// of them into this film. Returns how many films were loaded.
    pub fn load_all_in_folder(&mut self) -> Result<usize, Error> {
        let base = self.film_load_save.path.clone();
        let dir = match base.parent() {
            Some(parent) if parent.as_os_str().is_empty() => Path::new("."),
            Some(parent) => parent,
            None => Path::new("."),
        };
        let stem = base.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut films: Vec<PathBuf> = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().map(|ext| ext == "film") != Some(true) {
                continue;
            }
            let matches = path.file_name()
                .map(|name| name.to_string_lossy().starts_with(&stem))
                .unwrap_or(false);
            if matches {
                films.push(path);
            }
        }
        films.sort();

        let mut loaded = 0;
        for path in films {
            match self.load_film(&path) {
                Ok(()) => loaded += 1,
                Err(e) => warn!("film: could not load '{}': {}", path.display(), e),
            }
        }
        Ok(loaded)
    }
}
