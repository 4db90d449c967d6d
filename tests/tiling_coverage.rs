use tilematch::{ImageView, OwnedImage, Tiler, TilingConfig};

fn make_image(width: usize, height: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            let value = ((x * 13) ^ (y * 7) ^ (x * y)) & 0xFF;
            data.push(value.max(1) as u8);
        }
    }
    data
}

fn tiler(tile: usize, overlap: usize) -> Tiler {
    Tiler::new(TilingConfig {
        tile_width: tile,
        tile_height: tile,
        overlap,
    })
    .unwrap()
}

#[test]
fn every_pixel_is_covered_with_matching_content() {
    let (width, height) = (203, 117);
    let data = make_image(width, height);
    let view = ImageView::from_slice(&data, width, height).unwrap();

    for (tile, overlap) in [(64, 0), (64, 16), (50, 40), (256, 0)] {
        let grid = tiler(tile, overlap).compute(view).unwrap();
        let mut covered = vec![false; width * height];
        for t in grid.iter() {
            let origin = t.origin();
            assert_eq!(t.image().width(), tile);
            assert_eq!(t.image().height(), tile);
            for y in 0..t.valid_height() {
                for x in 0..t.valid_width() {
                    let (gx, gy) = (origin.x + x, origin.y + y);
                    assert_eq!(t.image().data()[y * tile + x], data[gy * width + gx]);
                    covered[gy * width + gx] = true;
                }
            }
        }
        assert!(covered.iter().all(|&c| c), "tile {tile}, overlap {overlap}");
    }
}

#[test]
fn grid_is_row_major_with_stride_tile_minus_overlap() {
    let data = make_image(1216, 448);
    let view = ImageView::from_slice(&data, 1216, 448).unwrap();
    let grid = tiler(448, 64).compute(view).unwrap();
    assert_eq!(grid.shape(), (3, 1));
    let xs: Vec<usize> = grid.iter().map(|t| t.origin().x).collect();
    assert_eq!(xs, vec![0, 384, 768]);
    for (i, t) in grid.iter().enumerate() {
        assert_eq!(t.index(), i);
        assert_eq!(t.padding().right, 0);
        assert_eq!(t.padding().bottom, 0);
    }
}

#[test]
fn edge_tiles_are_zero_padded() {
    let img = OwnedImage::filled(100, 70, 9).unwrap();
    let grid = tiler(64, 0).compute(img.view()).unwrap();
    assert_eq!(grid.shape(), (2, 2));
    let last = grid.get(3).unwrap();
    assert_eq!(last.padding().right, 28);
    assert_eq!(last.padding().bottom, 58);
    let data = last.image().data();
    assert_eq!(data[0], 9);
    assert_eq!(data[5 * 64 + 40], 0);
    assert_eq!(data[20 * 64 + 3], 0);
}

#[test]
fn small_image_yields_single_padded_tile() {
    let img = OwnedImage::filled(30, 20, 4).unwrap();
    let grid = tiler(448, 0).compute(img.view()).unwrap();
    assert_eq!(grid.len(), 1);
    let tile = grid.get(0).unwrap();
    assert_eq!((tile.valid_width(), tile.valid_height()), (30, 20));
    assert!(grid.get(1).is_err());
}
