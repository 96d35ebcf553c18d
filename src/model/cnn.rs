//! Compact CNN
//!
//! A small four-block convolutional network. Far cheaper than DenseNet-121,
//! which makes it the architecture of choice for CPU-only hosts and tests.

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d,
        Relu,
    },
    tensor::{backend::Backend, Tensor},
};

use super::ImageClassifier;

/// Configuration for the compact classifier
#[derive(Config, Debug)]
pub struct CompactClassifierConfig {
    /// Number of output classes
    pub num_classes: usize,

    /// Dropout rate before the final layer
    #[config(default = "0.3")]
    pub dropout_rate: f64,

    /// Base number of convolutional filters (doubled at every block)
    #[config(default = "32")]
    pub base_filters: usize,
}

impl CompactClassifierConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> CompactClassifier<B> {
        CompactClassifier::new(self, device)
    }
}

/// Conv2d, BatchNorm, ReLU and a 2x2 max-pool
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B>,
    pub relu: Relu,
    pub pool: MaxPool2d,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Same)
            .init(device);

        Self {
            conv,
            bn: BatchNormConfig::new(out_channels).init(device),
            relu: Relu::new(),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        let x = self.relu.forward(x);
        self.pool.forward(x)
    }
}

/// Compact image classifier
///
/// Architecture:
/// - 4 convolutional blocks (base, 2x, 4x, 8x filters), each halving resolution
/// - Global Average Pooling
/// - Linear(8x base, 256), ReLU, Dropout, Linear(256, num_classes)
///
/// Works with any input size of at least 16x16.
#[derive(Module, Debug)]
pub struct CompactClassifier<B: Backend> {
    pub conv1: ConvBlock<B>,
    pub conv2: ConvBlock<B>,
    pub conv3: ConvBlock<B>,
    pub conv4: ConvBlock<B>,

    pub global_pool: AdaptiveAvgPool2d,

    pub fc1: Linear<B>,
    pub dropout: Dropout,
    pub fc2: Linear<B>,

    num_classes: usize,
}

impl<B: Backend> CompactClassifier<B> {
    pub fn new(config: &CompactClassifierConfig, device: &B::Device) -> Self {
        let base = config.base_filters;

        Self {
            conv1: ConvBlock::new(3, base, device),
            conv2: ConvBlock::new(base, base * 2, device),
            conv3: ConvBlock::new(base * 2, base * 4, device),
            conv4: ConvBlock::new(base * 4, base * 8, device),
            global_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc1: LinearConfig::new(base * 8, 256).init(device),
            dropout: DropoutConfig::new(config.dropout_rate).init(),
            fc2: LinearConfig::new(256, config.num_classes).init(device),
            num_classes: config.num_classes,
        }
    }

    /// Forward pass: `[batch, 3, H, W]` images to `[batch, num_classes]` logits
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.conv1.forward(x);
        let x = self.conv2.forward(x);
        let x = self.conv3.forward(x);
        let x = self.conv4.forward(x);

        let x = self.global_pool.forward(x);
        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        let x = self.fc1.forward(x);
        let x = Relu::new().forward(x);
        let x = self.dropout.forward(x);
        self.fc2.forward(x)
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Output width of the loaded final layer
    pub fn output_width(&self) -> usize {
        self.fc2.weight.val().dims()[1]
    }
}

impl<B: Backend> ImageClassifier<B> for CompactClassifier<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        CompactClassifier::forward(self, images)
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }
}
