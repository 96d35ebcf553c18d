//! DenseNet-121
//!
//! Densely connected network with the torchvision layer layout: a 7x7 stem,
//! four dense blocks of (6, 12, 24, 16) layers joined by halving transitions,
//! a final batch norm and a linear classifier on globally pooled features.

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{
            AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, AvgPool2d, AvgPool2dConfig, MaxPool2d,
            MaxPool2dConfig,
        },
        BatchNorm, BatchNormConfig, Linear, LinearConfig, PaddingConfig2d,
    },
    tensor::{activation::relu, backend::Backend, Tensor},
};

use super::ImageClassifier;

/// Configuration for a DenseNet
#[derive(Config, Debug)]
pub struct DenseNetConfig {
    /// Number of output classes
    pub num_classes: usize,

    /// Channels added by every dense layer
    #[config(default = "32")]
    pub growth_rate: usize,

    /// Number of dense layers per block
    #[config(default = "vec![6, 12, 24, 16]")]
    pub block_config: Vec<usize>,

    /// Channels produced by the stem convolution
    #[config(default = "64")]
    pub num_init_features: usize,

    /// Bottleneck width multiplier (`bn_size * growth_rate` channels)
    #[config(default = "4")]
    pub bn_size: usize,
}

impl DenseNetConfig {
    /// The DenseNet-121 layout
    pub fn densenet121(num_classes: usize) -> Self {
        Self::new(num_classes)
    }

    /// Number of channels entering the classifier
    pub fn num_features(&self) -> usize {
        let mut features = self.num_init_features;
        for (i, &layers) in self.block_config.iter().enumerate() {
            features += layers * self.growth_rate;
            if i + 1 < self.block_config.len() {
                features /= 2;
            }
        }
        features
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> DenseNet<B> {
        DenseNet::new(self, device)
    }
}

fn conv_no_bias<B: Backend>(
    channels: [usize; 2],
    kernel: usize,
    stride: usize,
    padding: usize,
    device: &B::Device,
) -> Conv2d<B> {
    Conv2dConfig::new(channels, [kernel, kernel])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(padding, padding))
        .with_bias(false)
        .init(device)
}

/// BN-ReLU-Conv1x1 bottleneck followed by BN-ReLU-Conv3x3
#[derive(Module, Debug)]
pub struct DenseLayer<B: Backend> {
    pub norm1: BatchNorm<B>,
    pub conv1: Conv2d<B>,
    pub norm2: BatchNorm<B>,
    pub conv2: Conv2d<B>,
}

impl<B: Backend> DenseLayer<B> {
    fn new(in_channels: usize, growth_rate: usize, bn_size: usize, device: &B::Device) -> Self {
        let bottleneck = bn_size * growth_rate;
        Self {
            norm1: BatchNormConfig::new(in_channels).init(device),
            conv1: conv_no_bias([in_channels, bottleneck], 1, 1, 0, device),
            norm2: BatchNormConfig::new(bottleneck).init(device),
            conv2: conv_no_bias([bottleneck, growth_rate], 3, 1, 1, device),
        }
    }

    /// Returns the input with the new feature maps appended on the channel axis
    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = self.conv1.forward(relu(self.norm1.forward(x.clone())));
        let out = self.conv2.forward(relu(self.norm2.forward(out)));
        Tensor::cat(vec![x, out], 1)
    }
}

#[derive(Module, Debug)]
pub struct DenseBlock<B: Backend> {
    pub layers: Vec<DenseLayer<B>>,
}

impl<B: Backend> DenseBlock<B> {
    fn new(
        num_layers: usize,
        in_channels: usize,
        growth_rate: usize,
        bn_size: usize,
        device: &B::Device,
    ) -> Self {
        let layers = (0..num_layers)
            .map(|i| DenseLayer::new(in_channels + i * growth_rate, growth_rate, bn_size, device))
            .collect();
        Self { layers }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.layers.iter().fold(x, |x, layer| layer.forward(x))
    }
}

/// BN-ReLU-Conv1x1 then 2x2 average pooling
#[derive(Module, Debug)]
pub struct Transition<B: Backend> {
    pub norm: BatchNorm<B>,
    pub conv: Conv2d<B>,
    pub pool: AvgPool2d,
}

impl<B: Backend> Transition<B> {
    fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        Self {
            norm: BatchNormConfig::new(in_channels).init(device),
            conv: conv_no_bias([in_channels, out_channels], 1, 1, 0, device),
            pool: AvgPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.pool.forward(self.conv.forward(relu(self.norm.forward(x))))
    }
}

#[derive(Module, Debug)]
pub struct DenseNet<B: Backend> {
    pub conv0: Conv2d<B>,
    pub norm0: BatchNorm<B>,
    pub pool0: MaxPool2d,
    pub blocks: Vec<DenseBlock<B>>,
    pub transitions: Vec<Transition<B>>,
    pub norm5: BatchNorm<B>,
    pub global_pool: AdaptiveAvgPool2d,
    pub classifier: Linear<B>,

    num_features: usize,
    num_classes: usize,
}

impl<B: Backend> DenseNet<B> {
    pub fn new(config: &DenseNetConfig, device: &B::Device) -> Self {
        let conv0 = conv_no_bias([3, config.num_init_features], 7, 2, 3, device);
        let norm0 = BatchNormConfig::new(config.num_init_features).init(device);
        let pool0 = MaxPool2dConfig::new([3, 3])
            .with_strides([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init();

        let mut blocks = Vec::with_capacity(config.block_config.len());
        let mut transitions = Vec::with_capacity(config.block_config.len().saturating_sub(1));
        let mut features = config.num_init_features;

        for (i, &num_layers) in config.block_config.iter().enumerate() {
            blocks.push(DenseBlock::new(
                num_layers,
                features,
                config.growth_rate,
                config.bn_size,
                device,
            ));
            features += num_layers * config.growth_rate;

            if i + 1 < config.block_config.len() {
                transitions.push(Transition::new(features, features / 2, device));
                features /= 2;
            }
        }

        Self {
            conv0,
            norm0,
            pool0,
            blocks,
            transitions,
            norm5: BatchNormConfig::new(features).init(device),
            global_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            classifier: LinearConfig::new(features, config.num_classes).init(device),
            num_features: features,
            num_classes: config.num_classes,
        }
    }

    /// Replace the classification layer with a freshly initialized one
    ///
    /// Used after loading a backbone trained on a different label set.
    pub fn with_new_classifier(mut self, num_classes: usize, device: &B::Device) -> Self {
        self.classifier = LinearConfig::new(self.num_features, num_classes).init(device);
        self.num_classes = num_classes;
        self
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.conv0.forward(x);
        let x = relu(self.norm0.forward(x));
        let mut x = self.pool0.forward(x);

        for (i, block) in self.blocks.iter().enumerate() {
            x = block.forward(x);
            if let Some(transition) = self.transitions.get(i) {
                x = transition.forward(x);
            }
        }

        let x = relu(self.norm5.forward(x));
        let x = self.global_pool.forward(x);
        let [batch_size, channels, _, _] = x.dims();
        self.classifier.forward(x.reshape([batch_size, channels]))
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Output width of the loaded classification layer
    pub fn output_width(&self) -> usize {
        self.classifier.weight.val().dims()[1]
    }
}

impl<B: Backend> ImageClassifier<B> for DenseNet<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        DenseNet::forward(self, images)
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DefaultBackend;

    type TestBackend = DefaultBackend;

    #[test]
    fn test_densenet121_feature_count() {
        assert_eq!(DenseNetConfig::densenet121(8).num_features(), 1024);
    }

    #[test]
    fn test_small_densenet_forward_shape() {
        let device = Default::default();
        let config = DenseNetConfig::new(3)
            .with_growth_rate(4)
            .with_block_config(vec![1, 2])
            .with_num_init_features(8)
            .with_bn_size(2);
        let model = config.init::<TestBackend>(&device);

        // 8 + 1*4 = 12, halved to 6, then 6 + 2*4 = 14
        assert_eq!(model.num_features(), 14);
        assert_eq!(config.num_features(), 14);

        let output = model.forward(Tensor::zeros([2, 3, 32, 32], &device));
        assert_eq!(output.dims(), [2, 3]);
    }

    #[test]
    fn test_with_new_classifier() {
        let device = Default::default();
        let config = DenseNetConfig::new(10)
            .with_growth_rate(4)
            .with_block_config(vec![1])
            .with_num_init_features(8);
        let model = config.init::<TestBackend>(&device).with_new_classifier(2, &device);

        assert_eq!(model.num_classes(), 2);
        let output = model.forward(Tensor::zeros([1, 3, 16, 16], &device));
        assert_eq!(output.dims(), [1, 2]);
    }
}
