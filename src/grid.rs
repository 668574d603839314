//! Raster buffers passed between the pipeline stages.

use std::fmt;

use crate::error::{Error, Result};

/// Output value of a confirmed edge pixel.
pub const EDGE: u8 = 255;

/// A dense 8-bit single-channel raster: row-major, no padding between rows.
///
/// Stages receive read-only views of their input and exclusive access to a
/// freshly written output; no stage mutates a grid in place.
#[derive(Clone, PartialEq, Eq)]
pub struct PixelGrid {
    rows: usize,
    cols: usize,
    data: Vec<u8>,
}

impl PixelGrid {
    /// Allocates a zero-filled grid.
    pub fn new(rows: usize, cols: usize) -> Result<Self> {
        let len = rows
            .checked_mul(cols)
            .ok_or(Error::Allocation { rows, cols })?;
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| Error::Allocation { rows, cols })?;
        data.resize(len, 0);
        Ok(Self { rows, cols, data })
    }

    /// Wraps an existing row-major buffer.
    pub fn from_raw(rows: usize, cols: usize, data: Vec<u8>) -> Result<Self> {
        if Some(data.len()) != rows.checked_mul(cols) {
            return Err(Error::Config(format!(
                "buffer of {} bytes does not match a {}x{} grid",
                data.len(),
                rows,
                cols
            )));
        }
        Ok(Self { rows, cols, data })
    }

    /// Copies the pixels of a grayscale image.
    pub fn from_gray(image: &image::GrayImage) -> Result<Self> {
        Self::from_raw(
            image.height() as usize,
            image.width() as usize,
            image.as_raw().clone(),
        )
    }

    /// Renders the grid as a grayscale image.
    pub fn to_gray(&self) -> image::GrayImage {
        image::GrayImage::from_raw(self.cols as u32, self.rows as u32, self.data.clone())
            .expect("grid invariant: data.len() == rows * cols")
    }

    /// Row extent.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Column extent.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// The whole raster as one row-major slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Mutable access to the whole raster.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Pixel value at `(row, col)`.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> u8 {
        debug_assert!(row < self.rows && col < self.cols);
        self.data[row * self.cols + col]
    }

    /// Overwrites the pixel at `(row, col)`.
    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: u8) {
        debug_assert!(row < self.rows && col < self.cols);
        self.data[row * self.cols + col] = value;
    }

    /// One full row.
    #[inline]
    pub fn row(&self, row: usize) -> &[u8] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    /// Mutable access to one full row.
    #[inline]
    pub fn row_mut(&mut self, row: usize) -> &mut [u8] {
        &mut self.data[row * self.cols..(row + 1) * self.cols]
    }

    /// Copies the top-left `rows` x `cols` region into a new grid.
    pub fn crop(&self, rows: usize, cols: usize) -> Result<Self> {
        if rows > self.rows || cols > self.cols {
            return Err(Error::Config(format!(
                "cannot crop a {}x{} grid to {}x{}",
                self.rows, self.cols, rows, cols
            )));
        }
        let mut out = Self::new(rows, cols)?;
        for row in 0..rows {
            out.row_mut(row).copy_from_slice(&self.row(row)[..cols]);
        }
        Ok(out)
    }
}

impl fmt::Debug for PixelGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelGrid")
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .finish_non_exhaustive()
    }
}

/// Quantized gradient orientation, undirected (mod 180 degrees).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DirectionCode {
    /// No defined orientation; border pixels without full stencil support.
    Undefined,
    /// Gradient along the horizontal axis.
    Deg0,
    /// Gradient along the rising diagonal.
    Deg45,
    /// Gradient along the vertical axis.
    Deg90,
    /// Gradient along the falling diagonal.
    Deg135,
}

/// Per-pixel direction codes with the same extents as the magnitude grid.
///
/// Written once by the gradient stage and read-only afterwards.
#[derive(Clone)]
pub struct DirectionMap {
    rows: usize,
    cols: usize,
    codes: Vec<DirectionCode>,
}

impl DirectionMap {
    /// Allocates a map with every pixel `Undefined`.
    pub fn new(rows: usize, cols: usize) -> Result<Self> {
        let len = rows
            .checked_mul(cols)
            .ok_or(Error::Allocation { rows, cols })?;
        let mut codes = Vec::new();
        codes
            .try_reserve_exact(len)
            .map_err(|_| Error::Allocation { rows, cols })?;
        codes.resize(len, DirectionCode::Undefined);
        Ok(Self { rows, cols, codes })
    }

    /// Row extent.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Column extent.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Direction code at `(row, col)`.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> DirectionCode {
        debug_assert!(row < self.rows && col < self.cols);
        self.codes[row * self.cols + col]
    }

    /// One full row of codes.
    #[inline]
    pub fn row(&self, row: usize) -> &[DirectionCode] {
        &self.codes[row * self.cols..(row + 1) * self.cols]
    }

    /// Mutable access to one full row of codes.
    #[inline]
    pub fn row_mut(&mut self, row: usize) -> &mut [DirectionCode] {
        &mut self.codes[row * self.cols..(row + 1) * self.cols]
    }

    /// All codes as one row-major slice.
    pub fn as_slice(&self) -> &[DirectionCode] {
        &self.codes
    }

    /// Mutable access to all codes.
    pub fn as_mut_slice(&mut self) -> &mut [DirectionCode] {
        &mut self.codes
    }
}

/// Two grids of identical extents plus a role bit selecting which one is the
/// current stage input.
///
/// After a stage completes, [`BufferPair::swap`] flips the bit and the grid
/// just written becomes the next stage's input. A stage never reads the grid
/// it is writing.
pub struct BufferPair {
    a: PixelGrid,
    b: PixelGrid,
    front_is_a: bool,
}

impl BufferPair {
    /// Takes ownership of the initial input and allocates its counterpart.
    pub fn new(front: PixelGrid) -> Result<Self> {
        let back = PixelGrid::new(front.rows(), front.cols())?;
        Ok(Self {
            a: front,
            b: back,
            front_is_a: true,
        })
    }

    /// Read-only view of the current input together with exclusive access to
    /// the current output.
    pub fn split(&mut self) -> (&PixelGrid, &mut PixelGrid) {
        if self.front_is_a {
            (&self.a, &mut self.b)
        } else {
            (&self.b, &mut self.a)
        }
    }

    /// Flips the role bit.
    pub fn swap(&mut self) {
        self.front_is_a = !self.front_is_a;
    }

    /// The grid currently acting as input.
    pub fn front(&self) -> &PixelGrid {
        if self.front_is_a {
            &self.a
        } else {
            &self.b
        }
    }

    /// Consumes the pair, keeping the current input grid.
    pub fn into_front(self) -> PixelGrid {
        if self.front_is_a {
            self.a
        } else {
            self.b
        }
    }
}

#[cfg(test)]
pub(crate) fn noise_grid(rows: usize, cols: usize, mut seed: u32) -> PixelGrid {
    let mut grid = PixelGrid::new(rows, cols).unwrap();
    for v in grid.as_mut_slice() {
        seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        *v = (seed >> 24) as u8;
    }
    grid
}
