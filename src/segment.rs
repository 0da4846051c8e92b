// 该文件是 Recrop （裁切精修） 项目的一部分。
// src/segment.rs - 列表分片
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentError {
  #[error("分片大小必须大于 0")]
  ZeroShardSize,
  #[error("分片索引越界: {index}, 共 {shards} 个分片")]
  IndexOutOfRange { index: usize, shards: usize },
}

/// 按分片大小计算分片数量，即 `ceil(len / shard_size)`
pub fn shard_count(len: usize, shard_size: usize) -> Result<usize, SegmentError> {
  if shard_size == 0 {
    return Err(SegmentError::ZeroShardSize);
  }
  Ok(len.div_ceil(shard_size))
}

/// 取出第 `shard_index` 个分片
///
/// 除最后一个分片外，每个分片恰好包含 `shard_size` 个连续元素；
/// 最后一个分片包含剩余的 `len - shard_index * shard_size` 个元素。
/// 所有分片按顺序拼接即为原列表。
pub fn segment<T>(items: &[T], shard_size: usize, shard_index: usize) -> Result<&[T], SegmentError> {
  let shards = shard_count(items.len(), shard_size)?;
  if shard_index >= shards {
    return Err(SegmentError::IndexOutOfRange {
      index: shard_index,
      shards,
    });
  }

  let start = shard_index * shard_size;
  let end = if shard_index == shards - 1 {
    items.len()
  } else {
    start + shard_size
  };
  Ok(&items[start..end])
}

/// 按顺序遍历全部分片
pub fn shards<T>(
  items: &[T],
  shard_size: usize,
) -> Result<impl Iterator<Item = &[T]>, SegmentError> {
  let count = shard_count(items.len(), shard_size)?;
  Ok((0..count).filter_map(move |i| segment(items, shard_size, i).ok()))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn shards_reconstruct_the_list() {
    for len in 1..40usize {
      let items: Vec<usize> = (0..len).collect();
      for size in 1..=len {
        let joined: Vec<usize> = shards(&items, size).unwrap().flatten().copied().collect();
        assert_eq!(joined, items, "len={} size={}", len, size);
      }
    }
  }

  #[test]
  fn inner_shards_are_full_and_last_holds_remainder() {
    let items: Vec<u32> = (0..23).collect();
    let size = 5;
    let n = shard_count(items.len(), size).unwrap();
    assert_eq!(n, 5);
    for i in 0..n - 1 {
      assert_eq!(segment(&items, size, i).unwrap().len(), size);
    }
    let last = segment(&items, size, n - 1).unwrap();
    assert_eq!(last, &[20, 21, 22]);
    assert!(!last.is_empty() && last.len() <= size);
  }

  #[test]
  fn exact_multiple_gives_full_last_shard() {
    let items: Vec<u32> = (0..12).collect();
    assert_eq!(segment(&items, 4, 2).unwrap(), &[8, 9, 10, 11]);
  }

  #[test]
  fn shard_larger_than_list() {
    let items = ["a", "b", "c"];
    assert_eq!(segment(&items, 10, 0).unwrap(), &items[..]);
  }

  #[test]
  fn out_of_range_index_fails() {
    let items: Vec<u32> = (0..10).collect();
    assert_eq!(
      segment(&items, 3, 4),
      Err(SegmentError::IndexOutOfRange { index: 4, shards: 4 })
    );
    let empty: [u32; 0] = [];
    assert_eq!(
      segment(&empty, 3, 0),
      Err(SegmentError::IndexOutOfRange { index: 0, shards: 0 })
    );
  }

  #[test]
  fn zero_shard_size_fails() {
    assert_eq!(segment(&[1, 2, 3], 0, 0), Err(SegmentError::ZeroShardSize));
  }
}
