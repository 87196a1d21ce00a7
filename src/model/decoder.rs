// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/decoder.rs - 按解码器种类分发
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

use tracing::{debug, warn};

use crate::{
  config::DetectConfig,
  mapper::SourceSpace,
  model::{
    DecoderKind, DetectResult, LabelTable, OutputTensor,
    anchor::{decode_anchor_based, decode_single_class},
    fixed_slot::{FIXED_SLOT_NUM_OUTPUTS, FixedSlotOutputs, decode_fixed_slot},
    fixed5::{Size, decode_fixed5},
  },
};

/// 一帧解码所需的全部上下文，取自帧开始时的快照
#[derive(Debug, Clone, Copy)]
pub struct DecodeContext<'a> {
  pub labels: &'a LabelTable,
  pub config: &'a DetectConfig,
  /// 模型输入尺寸（宽，高）
  pub model_input: Size,
  /// 原始图像尺寸（宽，高）
  pub bitmap: Size,
}

impl DecodeContext<'_> {
  /// 模型正方形输入边长，取输入高度
  pub fn input_size(&self) -> f32 {
    self.model_input.1
  }
}

fn anchor_based(outputs: &[OutputTensor], ctx: &DecodeContext<'_>) -> DetectResult {
  let space = SourceSpace::ModelInput {
    size: ctx.input_size(),
  };
  match outputs.first() {
    Some(output) => DetectResult::new(
      decode_anchor_based(&output.data, &output.shape, ctx.labels, ctx.config),
      space,
    ),
    None => DetectResult::empty(space),
  }
}

/// 解码一帧的原始输出。任何情况下都不返回错误，最坏情况是空结果。
pub fn decode(kind: DecoderKind, outputs: &[OutputTensor], ctx: &DecodeContext<'_>) -> DetectResult {
  debug!("解码器: {:?}, 输出张量数: {}", kind, outputs.len());

  match kind {
    DecoderKind::AnchorBased => anchor_based(outputs, ctx),
    DecoderKind::SingleClassAnchor => {
      let space = SourceSpace::ModelInput {
        size: ctx.input_size(),
      };
      match outputs.first() {
        Some(output) => DetectResult::new(
          decode_single_class(&output.data, &output.shape, ctx.labels, ctx.config),
          space,
        ),
        None => DetectResult::empty(space),
      }
    }
    DecoderKind::FixedSlot => match FixedSlotOutputs::from_outputs(outputs) {
      Some(slots) => DetectResult::new(
        decode_fixed_slot(&slots, ctx.input_size(), ctx.labels, ctx.config),
        SourceSpace::ModelInput {
          size: ctx.input_size(),
        },
      ),
      None => {
        warn!(
          "定槽解码需要 {} 个输出，实际 {} 个，改用锚点解码",
          FIXED_SLOT_NUM_OUTPUTS,
          outputs.len()
        );
        anchor_based(outputs, ctx)
      }
    },
    DecoderKind::SpecializedFixed5 => {
      let space = SourceSpace::Bitmap {
        width: ctx.bitmap.0,
        height: ctx.bitmap.1,
      };
      match outputs.first() {
        Some(output) => DetectResult::new(
          decode_fixed5(
            &output.data,
            &output.shape,
            ctx.model_input,
            ctx.bitmap,
            ctx.labels,
            ctx.config,
          ),
          space,
        ),
        None => DetectResult::empty(space),
      }
    }
  }
}
